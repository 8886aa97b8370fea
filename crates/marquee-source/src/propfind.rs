//! WebDAV `PROPFIND` multistatus parsing.

use chrono::{DateTime, TimeZone, Utc};
use marquee_core::SourceEntry;
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::traits::{SourceError, SourceResult};

/// Request body asking for the properties a listing needs, including Nextcloud's upload time.
pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:nc="http://nextcloud.org/ns">
  <d:prop>
    <d:getlastmodified/>
    <d:getcontentlength/>
    <d:resourcetype/>
    <d:getetag/>
    <d:getcontenttype/>
    <d:creationdate/>
    <nc:creation_time/>
    <nc:upload_time/>
  </d:prop>
</d:propfind>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Href,
    LastModified,
    ContentLength,
    ContentType,
    Etag,
    UploadTime,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"href" => Some(Field::Href),
            b"getlastmodified" => Some(Field::LastModified),
            b"getcontentlength" => Some(Field::ContentLength),
            b"getcontenttype" => Some(Field::ContentType),
            b"getetag" => Some(Field::Etag),
            b"upload_time" => Some(Field::UploadTime),
            _ => None,
        }
    }
}

/// Properties of one `<d:response>` element as they appear on the wire.
#[derive(Debug, Default)]
struct RawResponse {
    href: String,
    last_modified: Option<String>,
    content_length: Option<String>,
    content_type: Option<String>,
    etag: Option<String>,
    upload_time: Option<String>,
    is_collection: bool,
}

impl RawResponse {
    fn set(&mut self, field: Field, text: &str) {
        let slot = match field {
            Field::Href => {
                self.href.push_str(text);
                return;
            }
            Field::LastModified => &mut self.last_modified,
            Field::ContentLength => &mut self.content_length,
            Field::ContentType => &mut self.content_type,
            Field::Etag => &mut self.etag,
            Field::UploadTime => &mut self.upload_time,
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }

    /// Upload time (unix seconds) when the server tracks it, else last-modified.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        let uploaded = self
            .upload_time
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        uploaded.or_else(|| {
            self.last_modified
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc2822(raw.trim()).ok())
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    fn into_entry(self, user_root: &str) -> Option<SourceEntry> {
        if self.is_collection || self.href.is_empty() || self.href.ends_with('/') {
            return None;
        }

        let decoded = percent_decode_str(&self.href).decode_utf8_lossy().into_owned();
        let name = decoded.rsplit('/').next().unwrap_or_default().to_string();
        if name.is_empty() {
            return None;
        }

        let Some(modified_at) = self.timestamp() else {
            tracing::warn!(
                href = %decoded,
                "Skipping entry without a usable upload or modification time"
            );
            return None;
        };

        let path = match decoded.find(user_root) {
            Some(idx) => decoded[idx + user_root.len()..].to_string(),
            None => decoded.trim_start_matches('/').to_string(),
        };

        Some(SourceEntry {
            path,
            name,
            size: self
                .content_length
                .as_deref()
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(0),
            content_type: self.content_type.filter(|ct| !ct.is_empty()),
            modified_at,
            etag: self
                .etag
                .map(|etag| etag.trim_matches('"').to_string())
                .filter(|etag| !etag.is_empty()),
        })
    }
}

/// Parse a `207 Multi-Status` body into file entries.
///
/// `user_root` is the decoded DAV prefix of the user's files
/// (`/remote.php/dav/files/{user}/`); it is stripped from each href to form the entry path.
/// Directories, including the listed directory itself, are skipped.
pub(crate) fn parse_multistatus(xml: &str, user_root: &str) -> SourceResult<Vec<SourceEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawResponse> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"response" => current = Some(RawResponse::default()),
                    b"collection" => {
                        if let Some(response) = current.as_mut() {
                            response.is_collection = true;
                        }
                    }
                    name => field = Field::from_local_name(name),
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(response) = current.as_mut() {
                        response.is_collection = true;
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(response), Some(field)) = (current.as_mut(), field) {
                    let text = text
                        .unescape()
                        .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
                    response.set(field, &text);
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take().and_then(|r| r.into_entry(user_root)) {
                        entries.push(entry);
                    }
                }
                field = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::InvalidResponse(format!(
                    "Malformed PROPFIND response at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/remote.php/dav/files/alice/";

    fn multistatus(responses: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:s="http://sabredav.org/ns" xmlns:oc="http://owncloud.org/ns" xmlns:nc="http://nextcloud.org/ns">{}</d:multistatus>"#,
            responses
        )
    }

    const DIRECTORY: &str = r#"
 <d:response>
  <d:href>/remote.php/dav/files/alice/Signage/</d:href>
  <d:propstat>
   <d:prop>
    <d:getlastmodified>Mon, 06 May 2024 08:00:00 GMT</d:getlastmodified>
    <d:resourcetype><d:collection/></d:resourcetype>
    <d:getetag>&quot;663890&quot;</d:getetag>
   </d:prop>
   <d:status>HTTP/1.1 200 OK</d:status>
  </d:propstat>
 </d:response>"#;

    #[test]
    fn parses_files_and_skips_directories() {
        let xml = multistatus(&format!(
            r#"{}
 <d:response>
  <d:href>/remote.php/dav/files/alice/Signage/Spring%20menu.jpg</d:href>
  <d:propstat>
   <d:prop>
    <d:getlastmodified>Tue, 07 May 2024 09:12:44 GMT</d:getlastmodified>
    <d:getcontentlength>48213</d:getcontentlength>
    <d:resourcetype/>
    <d:getetag>&quot;9a1b2c&quot;</d:getetag>
    <d:getcontenttype>image/jpeg</d:getcontenttype>
    <nc:upload_time>1715080000</nc:upload_time>
   </d:prop>
   <d:status>HTTP/1.1 200 OK</d:status>
  </d:propstat>
 </d:response>
 <d:response>
  <d:href>/remote.php/dav/files/alice/Signage/Archive/</d:href>
  <d:propstat>
   <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
   <d:status>HTTP/1.1 200 OK</d:status>
  </d:propstat>
 </d:response>"#,
            DIRECTORY
        ));

        let entries = parse_multistatus(&xml, ROOT).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.name, "Spring menu.jpg");
        assert_eq!(entry.path, "Signage/Spring menu.jpg");
        assert_eq!(entry.size, 48213);
        assert_eq!(entry.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(entry.etag.as_deref(), Some("9a1b2c"));
        assert_eq!(entry.modified_at.timestamp(), 1715080000);
    }

    #[test]
    fn falls_back_to_last_modified_when_upload_time_missing() {
        let xml = multistatus(
            r#"
 <d:response>
  <d:href>/remote.php/dav/files/alice/Signage/poster.png</d:href>
  <d:propstat>
   <d:prop>
    <d:getlastmodified>Tue, 07 May 2024 09:12:44 GMT</d:getlastmodified>
    <d:getcontentlength>10</d:getcontentlength>
   </d:prop>
   <d:status>HTTP/1.1 200 OK</d:status>
  </d:propstat>
  <d:propstat>
   <d:prop><nc:upload_time/><nc:creation_time/></d:prop>
   <d:status>HTTP/1.1 404 Not Found</d:status>
  </d:propstat>
 </d:response>"#,
        );

        let entries = parse_multistatus(&xml, ROOT).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].modified_at,
            Utc.with_ymd_and_hms(2024, 5, 7, 9, 12, 44).unwrap()
        );
        assert_eq!(entries[0].etag, None);
    }

    #[test]
    fn zero_upload_time_is_ignored() {
        let xml = multistatus(
            r#"
 <d:response>
  <d:href>/remote.php/dav/files/alice/a.jpg</d:href>
  <d:propstat><d:prop>
    <d:getlastmodified>Wed, 01 May 2024 00:00:00 GMT</d:getlastmodified>
    <nc:upload_time>0</nc:upload_time>
  </d:prop></d:propstat>
 </d:response>"#,
        );

        let entries = parse_multistatus(&xml, ROOT).unwrap();
        assert_eq!(
            entries[0].modified_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn entries_without_timestamp_are_skipped() {
        let xml = multistatus(
            r#"
 <d:response>
  <d:href>/remote.php/dav/files/alice/Signage/undated.jpg</d:href>
  <d:propstat><d:prop><d:getcontentlength>5</d:getcontentlength></d:prop></d:propstat>
 </d:response>"#,
        );

        assert!(parse_multistatus(&xml, ROOT).unwrap().is_empty());
    }

    #[test]
    fn server_in_subdirectory_keeps_user_relative_path() {
        let xml = multistatus(
            r#"
 <d:response>
  <d:href>/cloud/remote.php/dav/files/alice/Screens/Lobby/b%C3%A4ckerei.png</d:href>
  <d:propstat><d:prop><nc:upload_time>1715000000</nc:upload_time></d:prop></d:propstat>
 </d:response>"#,
        );

        let entries = parse_multistatus(&xml, ROOT).unwrap();
        assert_eq!(entries[0].path, "Screens/Lobby/bäckerei.png");
        assert_eq!(entries[0].name, "bäckerei.png");
    }

    #[test]
    fn empty_directory_yields_no_entries() {
        let xml = multistatus(DIRECTORY);
        assert!(parse_multistatus(&xml, ROOT).unwrap().is_empty());
    }

    #[test]
    fn malformed_xml_is_invalid_response() {
        let err = parse_multistatus("<d:multistatus><d:response></d:multistatus>", ROOT).unwrap_err();
        assert!(matches!(err, SourceError::InvalidResponse(_)));
    }
}
