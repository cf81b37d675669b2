use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use std::io::Cursor;
use thiserror::Error;

use super::FeedRecord;
use crate::categories::path::{strip_control_chars, SEPARATOR};
use crate::categories::{CategoryNode, CategoryTree, OrderMap};
use crate::gate::validate_record;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
const MAX_OPML_DEPTH: usize = 50;

#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),
}

/// Read an OPML file into feed records.
///
/// Folder outlines become category paths: a feed inside `Tech` inside `News`
/// gets category `News/Tech`. Record ids are the feed URLs.
///
/// # Security
///
/// - XXE: `quick-xml` (0.37) never parses `<!ENTITY>` declarations; custom
///   entity references fail to unescape.
/// - Feed URLs must be http(s); anything else is skipped with a warning.
pub async fn parse(path: &str) -> Result<Vec<FeedRecord>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read OPML file: {}", path))?;
    parse_opml_content(&content)
}

/// Parse OPML content. Feeds are returned in document order; a URL seen
/// twice keeps its first occurrence.
pub fn parse_opml_content(content: &str) -> Result<Vec<FeedRecord>> {
    // SEC-002: only the five predefined XML entities are ever resolved by
    // `decode_and_unescape_value()`.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut buf = Vec::new();
    // One entry per open <outline>; folders carry their name.
    let mut folders: Vec<Option<String>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if folders.len() >= MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH).into());
                }
                let outline = read_outline(&e, &reader)?;
                match outline.xml_url {
                    Some(_) => {
                        push_feed(outline, &folders, &mut seen, &mut feeds);
                        folders.push(None);
                    }
                    None => folders.push(outline.title.as_deref().and_then(folder_name)),
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let outline = read_outline(&e, &reader)?;
                if outline.xml_url.is_some() {
                    push_feed(outline, &folders, &mut seen, &mut feeds);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                folders.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string()).into()),
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(count = feeds.len(), "Parsed OPML");
    Ok(feeds)
}

struct Outline {
    title: Option<String>,
    xml_url: Option<String>,
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline> {
    let mut xml_url = None;
    let mut title = None;
    let mut text = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let decoder = reader.decoder();
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
            b"title" => title = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
            b"text" => text = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
            _ => {}
        }
    }

    Ok(Outline {
        title: title.or(text).filter(|t| !t.trim().is_empty()),
        xml_url: xml_url.filter(|u| !u.trim().is_empty()),
    })
}

/// Folder titles become one path segment, so the separator is replaced.
fn folder_name(title: &str) -> Option<String> {
    let name = strip_control_chars(title).replace(SEPARATOR, "-");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

fn push_feed(
    outline: Outline,
    folders: &[Option<String>],
    seen: &mut HashSet<String>,
    feeds: &mut Vec<FeedRecord>,
) {
    let Some(url) = outline.xml_url else {
        return;
    };

    let path: Vec<&str> = folders.iter().flatten().map(String::as_str).collect();
    let mut record = FeedRecord::new(url.trim(), url.trim());
    if !path.is_empty() {
        record.category = Some(path.join("/"));
    }
    // Exports without a custom title repeat the URL as the title.
    record.custom_title = outline.title.filter(|title| title.trim() != url.trim());

    match validate_record(record) {
        Ok(record) => {
            if seen.insert(record.id.clone()) {
                feeds.push(record);
            } else {
                tracing::debug!(url = %record.url, "Skipping duplicate feed in OPML");
            }
        }
        Err(e) => tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL"),
    }
}

/// Export the tree as an OPML 2.0 document.
///
/// Groups become nested folder outlines in `order_map` order, each listing
/// its own feeds before its child groups. Ungrouped feeds follow the groups
/// at body level. Empty leaf groups are omitted.
pub fn export_opml(tree: &CategoryTree, order_map: &OrderMap) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .context("Failed to write title element")?;
    writer
        .write_event(Event::Text(BytesText::new("feedshelf subscriptions")))
        .context("Failed to write title text")?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .context("Failed to write title end")?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;

    for node in tree.root.ordered("", order_map) {
        write_group(&mut writer, node, order_map)?;
    }
    for record in &tree.ungrouped {
        write_feed(&mut writer, record)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}

fn write_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    node: &CategoryNode,
    order_map: &OrderMap,
) -> Result<()> {
    if node.is_empty_leaf() {
        return Ok(());
    }

    let mut folder = BytesStart::new("outline");
    folder.push_attribute(("text", node.name.as_str()));
    folder.push_attribute(("title", node.name.as_str()));
    writer
        .write_event(Event::Start(folder))
        .with_context(|| format!("Failed to write folder '{}'", node.full_path))?;

    for record in &node.feeds {
        write_feed(writer, record)?;
    }
    for child in node.children.ordered(&node.full_path, order_map) {
        write_group(writer, child, order_map)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("outline")))
        .with_context(|| format!("Failed to close folder '{}'", node.full_path))?;
    Ok(())
}

fn write_feed(writer: &mut Writer<Cursor<Vec<u8>>>, record: &FeedRecord) -> Result<()> {
    let title = record.display_title();
    let mut outline = BytesStart::new("outline");
    outline.push_attribute(("type", "rss"));
    outline.push_attribute(("text", title));
    outline.push_attribute(("title", title));
    outline.push_attribute(("xmlUrl", record.url.as_str()));
    writer
        .write_event(Event::Empty(outline))
        .context("Failed to write outline element")?;
    Ok(())
}

/// Export the tree to an OPML file atomically: temp file, sync, rename.
pub fn export_to_file(
    tree: &CategoryTree,
    order_map: &OrderMap,
    path: &std::path::Path,
) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let content = export_opml(tree, order_map)?;

    // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    std::io::Write::write_all(&mut file, content.as_bytes()).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write OPML to '{}'", temp_path.display())
    })?;

    file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync '{}' to disk", temp_path.display())
    })?;

    drop(file);

    std::fs::rename(&temp_path, path).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    tracing::info!(path = %path.display(), feeds = tree.total_count(), "Exported OPML");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::build_tree;
    use pretty_assertions::assert_eq;

    fn categories(feeds: &[FeedRecord]) -> Vec<Option<&str>> {
        feeds.iter().map(|f| f.category.as_deref()).collect()
    }

    #[test]
    fn test_nested_folders_become_paths() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
<opml version="2.0">
  <head><title>Test Feeds</title></head>
  <body>
    <outline text="News">
      <outline type="rss" text="Daily" xmlUrl="https://daily.example.com/rss"/>
      <outline text="Tech" title="Tech">
        <outline type="rss" title="Rust Blog" xmlUrl="https://blog.rust-lang.org/feed.xml"/>
      </outline>
    </outline>
    <outline type="rss" text="Loose" xmlUrl="https://loose.example.com/rss"/>
  </body>
</opml>"#;

        let feeds = parse_opml_content(content).unwrap();
        assert_eq!(feeds.len(), 3);
        assert_eq!(categories(&feeds), vec![Some("News"), Some("News/Tech"), None]);
        assert_eq!(feeds[1].id, "https://blog.rust-lang.org/feed.xml");
        assert_eq!(feeds[1].custom_title.as_deref(), Some("Rust Blog"));
        assert_eq!(feeds[2].custom_title.as_deref(), Some("Loose"));
    }

    #[test]
    fn test_folder_names_are_single_segments() {
        let content = r#"<opml version="2.0"><body>
            <outline text="A/B"><outline xmlUrl="https://x.example.com/rss"/></outline>
            <outline text="  "><outline xmlUrl="https://y.example.com/rss"/></outline>
        </body></opml>"#;

        let feeds = parse_opml_content(content).unwrap();
        assert_eq!(categories(&feeds), vec![Some("A-B"), None]);
    }

    #[test]
    fn test_skip_invalid_and_duplicate_urls() {
        let content = r#"<?xml version="1.0"?>
    <opml version="2.0"><body>
        <outline xmlUrl="https://valid.com/feed"/>
        <outline xmlUrl="file:///etc/passwd"/>
        <outline xmlUrl="ftp://internal.server/feed"/>
        <outline xmlUrl="https://valid.com/feed"/>
    </body></opml>"#;

        let feeds = parse_opml_content(content).unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url, "https://valid.com/feed");
    }

    #[test]
    fn test_malformed_xml_error() {
        assert!(parse_opml_content("<not valid xml").is_err());
    }

    #[test]
    fn test_xxe_entity_not_expanded() {
        // SEC-002
        let malicious_opml = r#"<?xml version="1.0"?>
<!DOCTYPE opml [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<opml version="2.0">
    <body>
        <outline text="&xxe;" xmlUrl="https://example.com/feed.xml"/>
    </body>
</opml>"#;

        if let Ok(feeds) = parse_opml_content(malicious_opml) {
            for feed in &feeds {
                let title = feed.custom_title.as_deref().unwrap_or_default();
                assert!(!title.contains("root:"), "XXE expansion detected");
            }
        }
    }

    #[test]
    fn test_deeply_nested_opml_rejected() {
        // SEC-003
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..100 {
            opml.push_str(r#"<outline text="level">"#);
        }
        for _ in 0..100 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let err = parse_opml_content(&opml).unwrap_err().to_string();
        assert!(err.contains("depth") && err.contains("50"), "{}", err);
    }

    #[test]
    fn test_nesting_at_depth_limit_allowed() {
        let mut opml = String::from(r#"<?xml version="1.0"?><opml version="2.0"><body>"#);
        for _ in 0..50 {
            opml.push_str(r#"<outline text="level">"#);
        }
        opml.push_str(r#"<outline text="Deep Feed" xmlUrl="https://deep.example.com/feed"/>"#);
        for _ in 0..50 {
            opml.push_str("</outline>");
        }
        opml.push_str("</body></opml>");

        let feeds = parse_opml_content(&opml).unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].category_path().map(|p| p.split('/').count()), Some(50));
    }

    #[test]
    fn test_export_follows_display_order() {
        let flat = vec![
            FeedRecord::new("a", "https://a.example.com/rss").with_category("X"),
            FeedRecord::new("u", "https://u.example.com/rss"),
            FeedRecord::new("b", "https://b.example.com/rss").with_category("Y/Z"),
            FeedRecord::new("c", "https://c.example.com/rss").with_category("Y"),
        ];
        let tree = build_tree(&flat);
        let mut order_map = OrderMap::from_tree(&tree);
        order_map.set("", vec!["Y".into(), "X".into()]);

        let exported = export_opml(&tree, &order_map).unwrap();
        let parsed = parse_opml_content(&exported).unwrap();

        let urls: Vec<&str> = parsed.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://c.example.com/rss",
                "https://b.example.com/rss",
                "https://a.example.com/rss",
                "https://u.example.com/rss",
            ]
        );
        assert_eq!(categories(&parsed), vec![Some("Y"), Some("Y/Z"), Some("X"), None]);
    }

    #[test]
    fn test_export_escapes_titles() {
        let flat = vec![FeedRecord::new("a", "https://example.com/feed?a=1&b=2")
            .with_title("Feed with <special> & \"chars\"")];
        let tree = build_tree(&flat);

        let exported = export_opml(&tree, &OrderMap::default()).unwrap();
        let parsed = parse_opml_content(&exported).unwrap();

        assert_eq!(parsed[0].custom_title.as_deref(), Some("Feed with <special> & \"chars\""));
        assert_eq!(parsed[0].url, "https://example.com/feed?a=1&b=2");
    }

    #[test]
    fn test_export_to_file() {
        let flat = vec![FeedRecord::new("a", "https://example.com/feed.xml").with_category("Blogs")];
        let tree = build_tree(&flat);
        let path = std::env::temp_dir().join("feedshelf_test_export.opml");

        export_to_file(&tree, &OrderMap::default(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed = parse_opml_content(&content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category.as_deref(), Some("Blogs"));

        let _ = std::fs::remove_file(&path);
    }
}
