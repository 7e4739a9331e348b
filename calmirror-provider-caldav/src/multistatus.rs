//! Parsing of WebDAV multistatus (207) bodies.
//!
//! Element matching ignores namespace prefixes; servers disagree on them.

use anyhow::{Context, Result};
use roxmltree::{Document, Node};

/// A calendar collection found under the calendar home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCollection {
    pub href: String,
    pub display_name: Option<String>,
}

/// One `<response>` of a sync-collection REPORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEntry {
    pub href: String,
    /// Response-level status, set for removed members
    pub status: Option<u16>,
    pub etag: Option<String>,
    pub calendar_data: Option<String>,
}

/// A parsed sync-collection result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPage {
    pub entries: Vec<SyncEntry>,
    pub sync_token: Option<String>,
    /// The server returned 507: more changes are available under `sync_token`
    pub truncated: bool,
}

fn is(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn child<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is(n, name))
}

fn descendant<'a, 'input>(node: &Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| is(n, name))
}

fn text(node: Option<Node>) -> Option<String> {
    node.and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// "HTTP/1.1 404 Not Found" -> 404
fn parse_status(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn responses<'a, 'input>(doc: &'a Document<'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.root_element().children().filter(|n| is(n, "response"))
}

/// The `<href>` inside the first occurrence of `property`, e.g.
/// `current-user-principal` or `calendar-home-set`.
pub fn property_href(xml: &str, property: &str) -> Result<Option<String>> {
    let doc = Document::parse(xml).context("Invalid multistatus XML")?;
    Ok(doc
        .descendants()
        .find(|n| is(n, property))
        .and_then(|prop| text(descendant(&prop, "href"))))
}

/// Calendar collections listed by a Depth 1 PROPFIND on the calendar home.
pub fn calendar_collections(xml: &str) -> Result<Vec<CalendarCollection>> {
    let doc = Document::parse(xml).context("Invalid multistatus XML")?;

    let collections = responses(&doc)
        .filter(|response| {
            descendant(response, "resourcetype")
                .is_some_and(|rt| rt.children().any(|n| is(&n, "calendar")))
        })
        .filter_map(|response| {
            let href = text(child(&response, "href"))?;
            let display_name = text(descendant(&response, "displayname"));
            Some(CalendarCollection { href, display_name })
        })
        .collect();

    Ok(collections)
}

/// Parse the result of a sync-collection REPORT.
pub fn sync_page(xml: &str) -> Result<SyncPage> {
    let doc = Document::parse(xml).context("Invalid sync-collection XML")?;
    let mut page = SyncPage {
        sync_token: text(child(&doc.root_element(), "sync-token")),
        ..SyncPage::default()
    };

    for response in responses(&doc) {
        let Some(href) = text(child(&response, "href")) else {
            continue;
        };
        let status = child(&response, "status")
            .and_then(|n| n.text())
            .and_then(parse_status);

        if status == Some(507) {
            page.truncated = true;
            continue;
        }

        page.entries.push(SyncEntry {
            href,
            status,
            etag: text(descendant(&response, "getetag")),
            calendar_data: text(descendant(&response, "calendar-data")),
        });
    }

    Ok(page)
}
