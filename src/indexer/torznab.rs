//! Torznab XML documents for downstream applications
//!
//! `caps` describes what an indexer can search; the results feed is RSS 2.0
//! with Torznab extensions.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use super::categories::{get_category, get_parent_category};
use super::types::{Capabilities, DownloadProtocol, ReleaseRecord};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Torznab error codes used in `<error>` documents
pub mod error_codes {
    pub const INCORRECT_CREDENTIALS: u16 = 100;
    pub const MISSING_PARAMETER: u16 = 200;
    pub const FUNCTION_NOT_AVAILABLE: u16 = 203;
    pub const UNKNOWN_ERROR: u16 = 900;
}

/// Build the `caps` document for an indexer
pub fn caps_xml(title: &str, caps: &Capabilities) -> String {
    render(|writer| {
        writer.write_event(Event::Start(BytesStart::new("caps")))?;

        let mut server = BytesStart::new("server");
        server.push_attribute(("title", title));
        writer.write_event(Event::Empty(server))?;

        if caps.limits_default.is_some() || caps.limits_max.is_some() {
            let mut limits = BytesStart::new("limits");
            if let Some(def) = caps.limits_default {
                limits.push_attribute(("default", def.to_string().as_str()));
            }
            if let Some(max) = caps.limits_max {
                limits.push_attribute(("max", max.to_string().as_str()));
            }
            writer.write_event(Event::Empty(limits))?;
        }

        writer.write_event(Event::Start(BytesStart::new("searching")))?;
        write_search_element(writer, "search", caps.search_available, "q")?;
        write_search_element(
            writer,
            "tv-search",
            caps.tv_search_available(),
            &param_list(caps.tv_search_params.iter().map(|p| p.as_str())),
        )?;
        write_search_element(
            writer,
            "movie-search",
            caps.movie_search_available(),
            &param_list(caps.movie_search_params.iter().map(|p| p.as_str())),
        )?;
        write_search_element(
            writer,
            "music-search",
            caps.music_search_available(),
            &param_list(caps.music_search_params.iter().map(|p| p.as_str())),
        )?;
        write_search_element(
            writer,
            "book-search",
            caps.book_search_available(),
            &param_list(caps.book_search_params.iter().map(|p| p.as_str())),
        )?;
        writer.write_event(Event::End(BytesEnd::new("searching")))?;

        writer.write_event(Event::Start(BytesStart::new("categories")))?;
        write_categories(writer, &caps.categories.standard_categories())?;
        writer.write_event(Event::End(BytesEnd::new("categories")))?;

        writer.write_event(Event::End(BytesEnd::new("caps")))?;
        Ok(())
    })
}

/// Build an RSS results feed
pub fn results_xml(title: &str, description: &str, link: &str, releases: &[ReleaseRecord]) -> String {
    render(|writer| {
        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
        rss.push_attribute(("xmlns:torznab", "http://torznab.com/schemas/2015/feed"));
        writer.write_event(Event::Start(rss))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        write_text_element(writer, "title", title)?;
        write_text_element(writer, "description", description)?;
        write_text_element(writer, "link", link)?;
        write_text_element(writer, "language", "en-us")?;

        for release in releases {
            write_release_item(writer, release)?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;
        Ok(())
    })
}

/// Build an `<error code=".." description=".."/>` document
pub fn error_xml(code: u16, description: &str) -> String {
    render(|writer| {
        let mut error = BytesStart::new("error");
        error.push_attribute(("code", code.to_string().as_str()));
        error.push_attribute(("description", description));
        writer.write_event(Event::Empty(error))?;
        Ok(())
    })
}

fn render<F>(body: F) -> String
where
    F: FnOnce(&mut XmlWriter) -> std::io::Result<()>,
{
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let written = writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .and_then(|_| body(&mut writer));
    if let Err(e) = written {
        tracing::error!(error = %e, "Failed to write Torznab XML");
        return String::new();
    }
    String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned()
}

fn param_list<'a>(params: impl Iterator<Item = &'a str>) -> String {
    let mut list = vec!["q"];
    list.extend(params.filter(|p| *p != "q"));
    list.join(",")
}

/// Parents first, each followed by its subcategories
fn write_categories(writer: &mut XmlWriter, standard: &[i32]) -> std::io::Result<()> {
    let mut parents: Vec<i32> = standard
        .iter()
        .map(|&c| get_parent_category(c).map_or(c, |p| p.id))
        .collect();
    parents.sort_unstable();
    parents.dedup();

    for parent in parents {
        let name = get_category(parent).map_or("Other", |c| c.name);
        let mut elem = BytesStart::new("category");
        elem.push_attribute(("id", parent.to_string().as_str()));
        elem.push_attribute(("name", name));

        let subcats: Vec<_> = standard
            .iter()
            .filter_map(|&c| get_category(c))
            .filter(|c| c.parent_id == Some(parent))
            .collect();
        if subcats.is_empty() {
            writer.write_event(Event::Empty(elem))?;
            continue;
        }

        writer.write_event(Event::Start(elem))?;
        for sub in subcats {
            let mut subcat = BytesStart::new("subcat");
            subcat.push_attribute(("id", sub.id.to_string().as_str()));
            subcat.push_attribute(("name", sub.name));
            writer.write_event(Event::Empty(subcat))?;
        }
        writer.write_event(Event::End(BytesEnd::new("category")))?;
    }
    Ok(())
}

fn write_text_element(writer: &mut XmlWriter, name: &str, text: &str) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_search_element(
    writer: &mut XmlWriter,
    name: &str,
    available: bool,
    params: &str,
) -> std::io::Result<()> {
    let mut elem = BytesStart::new(name);
    elem.push_attribute(("available", if available { "yes" } else { "no" }));
    elem.push_attribute(("supportedParams", params));
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

fn write_torznab_attr(writer: &mut XmlWriter, name: &str, value: &str) -> std::io::Result<()> {
    let mut attr = BytesStart::new("torznab:attr");
    attr.push_attribute(("name", name));
    attr.push_attribute(("value", value));
    writer.write_event(Event::Empty(attr))?;
    Ok(())
}

fn write_release_item(writer: &mut XmlWriter, release: &ReleaseRecord) -> std::io::Result<()> {
    writer.write_event(Event::Start(BytesStart::new("item")))?;

    write_text_element(writer, "title", &release.title)?;
    write_text_element(writer, "guid", &release.guid)?;
    if let Some(ref indexer) = release.indexer_name {
        write_text_element(writer, "jackettindexer", indexer)?;
    }
    if let Some(ref details) = release.info_url {
        write_text_element(writer, "comments", details)?;
    }
    write_text_element(writer, "pubDate", &format_rfc2822(&release.publish_date))?;
    write_text_element(writer, "size", &release.size.to_string())?;
    if let Some(ref desc) = release.description {
        write_text_element(writer, "description", desc)?;
    }

    let link = release
        .download_url
        .as_deref()
        .or(release.magnet_uri.as_deref())
        .unwrap_or("");
    write_text_element(writer, "link", link)?;

    for cat in &release.categories {
        write_text_element(writer, "category", &cat.to_string())?;
    }

    if !link.is_empty() {
        let mut enclosure = BytesStart::new("enclosure");
        enclosure.push_attribute(("url", link));
        enclosure.push_attribute(("length", release.size.to_string().as_str()));
        let mime = match release.protocol {
            DownloadProtocol::Torrent => "application/x-bittorrent",
            DownloadProtocol::Usenet => "application/x-nzb",
        };
        enclosure.push_attribute(("type", mime));
        writer.write_event(Event::Empty(enclosure))?;
    }

    for cat in &release.categories {
        write_torznab_attr(writer, "category", &cat.to_string())?;
    }
    if release.protocol == DownloadProtocol::Torrent {
        write_torznab_attr(writer, "seeders", &release.seeders.to_string())?;
        write_torznab_attr(writer, "peers", &release.peers.to_string())?;
    }
    write_torznab_attr(writer, "files", &release.files.to_string())?;
    write_torznab_attr(writer, "grabs", &release.grabs.to_string())?;

    if let Some(imdb) = release.imdb {
        write_torznab_attr(writer, "imdbid", &format!("tt{:07}", imdb))?;
    }
    if let Some(tvdb) = release.tvdb_id {
        write_torznab_attr(writer, "tvdbid", &tvdb.to_string())?;
    }
    if let Some(ref info_hash) = release.info_hash {
        write_torznab_attr(writer, "infohash", info_hash)?;
    }
    if let Some(ref magnet) = release.magnet_uri {
        write_torznab_attr(writer, "magneturl", magnet)?;
    }

    write_torznab_attr(
        writer,
        "downloadvolumefactor",
        &release.download_volume_factor.to_string(),
    )?;
    write_torznab_attr(
        writer,
        "uploadvolumefactor",
        &release.upload_volume_factor.to_string(),
    )?;
    if let Some(ratio) = release.minimum_ratio {
        write_torznab_attr(writer, "minimumratio", &ratio.to_string())?;
    }
    if let Some(seed_time) = release.minimum_seed_time {
        write_torznab_attr(writer, "minimumseedtime", &seed_time.to_string())?;
    }

    writer.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn format_rfc2822(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S %z").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::indexer::categories::cats;
    use crate::indexer::types::TvSearchParam;

    #[test]
    fn test_caps_xml() {
        let mut caps = Capabilities::new();
        caps.tv_search_params = vec![TvSearchParam::Q, TvSearchParam::Season, TvSearchParam::Ep];
        caps.categories.add_mapping("10", cats::TV_HD);
        caps.categories.add_mapping("10", cats::TV_SD);
        caps.categories.add_mapping("9", cats::MOVIES);

        let xml = caps_xml("Test", &caps);
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"<server title="Test"/>"#));
        assert!(xml.contains(r#"<limits default="100" max="100"/>"#));
        assert!(xml.contains(r#"<tv-search available="yes" supportedParams="q,season,ep"/>"#));
        assert!(xml.contains(r#"<movie-search available="no" supportedParams="q"/>"#));
        assert!(xml.contains(r#"<category id="2000" name="Movies"/>"#));
        assert!(xml.contains(r#"<category id="5000" name="TV"><subcat id="5030""#));
    }

    #[test]
    fn test_results_xml() {
        let mut release = ReleaseRecord::new(
            "Show S01E01 & More".to_string(),
            "bb-1".to_string(),
            DownloadProtocol::Torrent,
        );
        release.download_url = Some("https://site.example/dl?id=1&key=x".to_string());
        release.publish_date = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        release.size = 1024;
        release.seeders = 5;
        release.peers = 7;
        release.download_volume_factor = 0.0;
        release.minimum_ratio = Some(1.0);
        release.minimum_seed_time = Some(172800);
        release.categories = vec![cats::TV_HD];

        let xml = results_xml("Site", "Site feed", "https://site.example/", &[release]);
        assert!(xml.contains("<title>Show S01E01 &amp; More</title>"));
        assert!(xml.contains("<guid>bb-1</guid>"));
        assert!(xml.contains("<pubDate>Sun, 10 Mar 2024 12:00:00 +0000</pubDate>"));
        assert!(xml.contains(r#"<torznab:attr name="seeders" value="5"/>"#));
        assert!(xml.contains(r#"<torznab:attr name="downloadvolumefactor" value="0"/>"#));
        assert!(xml.contains(r#"<torznab:attr name="minimumseedtime" value="172800"/>"#));
        assert!(xml.contains(r#"type="application/x-bittorrent""#));
    }

    #[test]
    fn test_error_xml() {
        assert!(
            error_xml(error_codes::INCORRECT_CREDENTIALS, "Invalid API key")
                .contains(r#"<error code="100" description="Invalid API key"/>"#)
        );
    }
}
