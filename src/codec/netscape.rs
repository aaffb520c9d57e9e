//! Netscape bookmark file (`<!DOCTYPE NETSCAPE-Bookmark-file-1>`).
//!
//! Every title and URL is escaped on the way out; imported files are
//! untrusted and the output is usually opened by a browser.

use scraper::{Html, Selector};

use super::{finish, DecodeOutcome, RejectReason};
use crate::bookmark::{now_millis, BookmarkRecord};
use crate::error::{Result, StageError};
use crate::validator::is_valid_url;

const PREAMBLE: &str = "<!DOCTYPE NETSCAPE-Bookmark-file-1>
<!-- This is an automatically generated file.
     It will be read and overwritten.
     DO NOT EDIT! -->
<META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=UTF-8\">
<TITLE>Bookmarks</TITLE>
<H1>Bookmarks</H1>
<DL><p>
";

const EPILOGUE: &str = "</DL><p>\n";

/// Escape the five markup metacharacters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn encode(records: &[BookmarkRecord]) -> String {
    let mut html = String::from(PREAMBLE);

    for record in records {
        let add_date = record.added_at.div_euclid(1000);
        html.push_str(&format!(
            "    <DT><A HREF=\"{}\" ADD_DATE=\"{}\">{}</A>\n",
            escape(&record.url),
            add_date,
            escape(&record.title)
        ));
    }

    html.push_str(EPILOGUE);
    html
}

pub fn decode(html: &str) -> Result<DecodeOutcome> {
    if html.trim().is_empty() {
        return Err(StageError::MalformedInput("empty bookmark document".into()));
    }

    let link_selector = selector("a[href]")?;
    let list_selector = selector("dl")?;

    let document = Html::parse_document(html);
    let links: Vec<_> = document.select(&link_selector).collect();

    if links.is_empty() && document.select(&list_selector).next().is_none() {
        return Err(StageError::MalformedInput(
            "failed to parse HTML file: no bookmark list found".into(),
        ));
    }

    let now = now_millis();
    let candidates = links
        .into_iter()
        .map(|link| {
            let url = link.value().attr("href").unwrap_or_default().trim();
            if url.is_empty() {
                return Err(RejectReason::MissingUrl);
            }
            if !is_valid_url(url) {
                return Err(RejectReason::UnsafeUrl);
            }

            let title = link.text().collect::<String>();
            let added_at = link
                .value()
                .attr("add_date")
                .and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|secs| *secs > 0)
                .and_then(|secs| secs.checked_mul(1000))
                .unwrap_or(now);

            Ok(BookmarkRecord::new(title, url, added_at))
        })
        .collect();

    finish(candidates)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| StageError::MalformedInput(format!("selector {}: {:?}", css, e)))
}
