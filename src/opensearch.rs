//! OpenSearch provider descriptor.
//!
//! Lets browsers register the portal as a search engine. The descriptor
//! advertises two URL templates relative to the portal's base URL:
//!
//! - `text/html`: `/opensearch/search?q={searchTerms}`, which redirects to
//!   the results page
//! - `application/x-suggestions+json`: `/suggestions?q={searchTerms}`

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

pub const CONTENT_TYPE: &str = "application/opensearchdescription+xml";
pub const CACHE_CONTROL: &str = "public, max-age=86400";

const SHORT_NAME: &str = "Ecton Search";
const DESCRIPTION: &str =
    "Ecton Internal Network Search Engine - Search company resources, documents, and systems";

fn text_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render the descriptor for a portal served at `base_url`.
pub fn descriptor_xml(base_url: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(
        BytesStart::new("OpenSearchDescription").with_attributes([
            ("xmlns", "http://a9.com/-/spec/opensearch/1.1/"),
            ("xmlns:moz", "http://www.mozilla.org/2006/browser/search/"),
        ]),
    ))?;

    text_element(&mut writer, "ShortName", SHORT_NAME)?;
    text_element(&mut writer, "Description", DESCRIPTION)?;
    text_element(&mut writer, "InputEncoding", "UTF-8")?;

    writer.write_event(Event::Start(BytesStart::new("Image").with_attributes([
        ("width", "16"),
        ("height", "16"),
        ("type", "image/x-icon"),
    ])))?;
    writer.write_event(Event::Text(BytesText::new(&format!("{}/favicon.ico", base))))?;
    writer.write_event(Event::End(BytesEnd::new("Image")))?;

    let html_template = format!("{}/opensearch/search?q={{searchTerms}}", base);
    writer.write_event(Event::Empty(BytesStart::new("Url").with_attributes([
        ("type", "text/html"),
        ("method", "get"),
        ("template", html_template.as_str()),
    ])))?;

    let suggest_template = format!("{}/suggestions?q={{searchTerms}}", base);
    writer.write_event(Event::Empty(BytesStart::new("Url").with_attributes([
        ("type", "application/x-suggestions+json"),
        ("method", "get"),
        ("template", suggest_template.as_str()),
    ])))?;

    text_element(&mut writer, "moz:SearchForm", &format!("{}/", base))?;
    text_element(&mut writer, "Developer", "Ecton Internal Team")?;
    text_element(&mut writer, "Contact", "admin@internal.company.com")?;
    text_element(&mut writer, "Tags", "internal company search network resources")?;
    text_element(&mut writer, "Language", "en-us")?;
    text_element(&mut writer, "OutputEncoding", "UTF-8")?;
    text_element(&mut writer, "SyndicationRight", "private")?;
    text_element(&mut writer, "AdultContent", "false")?;

    writer.write_event(Event::End(BytesEnd::new("OpenSearchDescription")))?;

    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Where `/opensearch/search?q=` sends the browser.
///
/// Non-blank queries go to `results_page?q=<trimmed>`; anything else goes
/// to the homepage.
pub fn redirect_target(q: Option<&str>, results_page: &str) -> String {
    match q.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let encoded: String = url::form_urlencoded::byte_serialize(q.as_bytes()).collect();
            format!("{}?q={}", results_page, encoded)
        }
        None => "/".to_string(),
    }
}
