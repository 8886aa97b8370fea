//! Domain methods for the Xibo CMS client.
//!
//! Wire types mirror the CMS JSON shapes; conversions into `marquee_core` models
//! happen here so the publish workflow never sees raw responses.

use crate::{CmsError, CmsResult, XiboClient};
use chrono::NaiveDateTime;
use marquee_core::{MediaRef, Presentation, ScheduleEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Xibo event type for full-screen campaign content.
const EVENT_TYPE_FULLSCREEN: u8 = 7;
/// Day part "custom": honour fromDt/toDt.
const DAY_PART_CUSTOM: u8 = 1;
const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct LibraryUploadResponse {
    #[serde(default)]
    files: Vec<LibraryUploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LibraryUploadFile {
    media_id: Option<i64>,
    name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutResponse {
    layout_id: i64,
    campaign_id: Option<i64>,
    #[serde(default)]
    layout: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleCreated {
    event_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisplayGroupRecord {
    display_group_id: i64,
}

/// A screen resolution known to the CMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub resolution_id: i64,
    #[serde(default)]
    pub resolution: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// A display registered with the CMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub display_id: i64,
    pub display: String,
    #[serde(default)]
    pub display_group_id: Option<i64>,
    #[serde(default)]
    pub logged_in: Option<i64>,
}

/// A schedule event as listed by the CMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub event_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_priority: Option<i64>,
}

impl From<ScheduleRecord> for ScheduleEntry {
    fn from(record: ScheduleRecord) -> Self {
        ScheduleEntry {
            event_id: record.event_id,
            name: record.name.unwrap_or_default(),
            is_priority: record.is_priority.unwrap_or(0) > 0,
        }
    }
}

impl XiboClient {
    /// CMS version information, used as a connectivity check.
    pub async fn about(&self) -> CmsResult<serde_json::Value> {
        self.get("about", &[]).await
    }

    /// Upload a local file to the media library.
    pub async fn upload_media(
        &self,
        file_path: &Path,
        name: &str,
        content_type: Option<&str>,
        tags: Option<&str>,
    ) -> CmsResult<MediaRef> {
        let data = tokio::fs::read(file_path).await?;
        let filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("media")
            .to_string();

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename)
            .mime_str(content_type.unwrap_or("application/octet-stream"))
            .map_err(|e| CmsError::InvalidResponse(format!("Invalid content type: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("name", name.to_string());
        if let Some(tags) = tags {
            form = form.text("tags", tags.to_string());
        }

        let response: LibraryUploadResponse = self.post_multipart("library", form).await?;
        let file = response
            .files
            .into_iter()
            .next()
            .ok_or_else(|| CmsError::InvalidResponse("Upload response contained no files".to_string()))?;

        if let Some(error) = file.error.filter(|e| !e.is_empty()) {
            return Err(CmsError::InvalidResponse(format!("Upload rejected: {}", error)));
        }
        let media_id = file
            .media_id
            .ok_or_else(|| CmsError::InvalidResponse("Upload response has no mediaId".to_string()))?;

        Ok(MediaRef {
            media_id,
            name: file.name.unwrap_or_else(|| name.to_string()),
        })
    }

    pub async fn resolutions(&self) -> CmsResult<Vec<Resolution>> {
        self.get("resolution", &[]).await
    }

    /// Resolution id matching the given geometry, if the CMS knows one.
    pub async fn find_resolution(&self, width: u32, height: u32) -> CmsResult<Option<i64>> {
        let resolutions = self.resolutions().await?;
        Ok(resolutions
            .into_iter()
            .find(|r| r.width == width && r.height == height)
            .map(|r| r.resolution_id))
    }

    /// Create a full-screen layout showing a single media item.
    pub async fn create_fullscreen_layout(
        &self,
        media_id: i64,
        name: &str,
        resolution_id: Option<i64>,
        background_color: &str,
    ) -> CmsResult<Presentation> {
        let mut form = vec![
            ("id".to_string(), media_id.to_string()),
            ("type".to_string(), "media".to_string()),
            ("name".to_string(), name.to_string()),
            ("backgroundColor".to_string(), background_color.to_string()),
        ];
        if let Some(resolution_id) = resolution_id {
            form.push(("resolutionId".to_string(), resolution_id.to_string()));
        }

        let layout: LayoutResponse = self.post_form("layout/fullscreen", &form).await?;
        let campaign_id = layout.campaign_id.ok_or_else(|| {
            CmsError::InvalidResponse(format!("Layout {} has no campaignId", layout.layout_id))
        })?;

        Ok(Presentation {
            layout_id: layout.layout_id,
            campaign_id,
            name: layout.layout.unwrap_or_else(|| name.to_string()),
        })
    }

    pub async fn displays(&self) -> CmsResult<Vec<DisplayRecord>> {
        self.get("display", &[]).await
    }

    /// Displays whose name contains `name`; the CMS filter is a substring match.
    pub async fn search_displays(&self, name: &str) -> CmsResult<Vec<DisplayRecord>> {
        self.get("display", &[("display", name.to_string())]).await
    }

    /// The display-specific group the CMS keeps for every display.
    pub async fn display_specific_group(&self, display_id: i64) -> CmsResult<Option<i64>> {
        let groups: Vec<DisplayGroupRecord> = self
            .get(
                "displaygroup",
                &[
                    ("displayId", display_id.to_string()),
                    ("isDisplaySpecific", "1".to_string()),
                ],
            )
            .await?;
        Ok(groups.first().map(|g| g.display_group_id))
    }

    /// Schedule a campaign full-screen on a display group with priority over manual events.
    pub async fn create_schedule(
        &self,
        campaign_id: i64,
        display_group_id: i64,
        name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> CmsResult<ScheduleEntry> {
        let form = vec![
            ("name".to_string(), name.to_string()),
            ("eventTypeId".to_string(), EVENT_TYPE_FULLSCREEN.to_string()),
            ("fromDt".to_string(), from.format(SCHEDULE_TIME_FORMAT).to_string()),
            ("toDt".to_string(), to.format(SCHEDULE_TIME_FORMAT).to_string()),
            ("fullScreenCampaignId".to_string(), campaign_id.to_string()),
            ("displayOrder".to_string(), "0".to_string()),
            ("isPriority".to_string(), "1".to_string()),
            ("dayPartId".to_string(), DAY_PART_CUSTOM.to_string()),
            ("displayGroupIds[0]".to_string(), display_group_id.to_string()),
        ];

        let created: ScheduleCreated = self.post_form("schedule", &form).await?;
        Ok(ScheduleEntry {
            event_id: created.event_id,
            name: name.to_string(),
            is_priority: true,
        })
    }

    pub async fn schedules_for_group(&self, display_group_id: i64) -> CmsResult<Vec<ScheduleEntry>> {
        let records: Vec<ScheduleRecord> = self
            .get("schedule", &[("displayGroupIds[]", display_group_id.to_string())])
            .await?;
        Ok(records.into_iter().map(ScheduleEntry::from).collect())
    }

    pub async fn delete_schedule(&self, event_id: i64) -> CmsResult<()> {
        self.delete(&format!("schedule/{}", event_id)).await
    }

    /// Ask the players in a display group to collect their schedule now.
    pub async fn collect_now(&self, display_group_id: i64) -> CmsResult<()> {
        self.post_action(&format!("displaygroup/{}/action/collectNow", display_group_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use crate::CmsError;
    use chrono::NaiveDate;
    use mockito::Matcher;
    use std::io::Write;

    #[tokio::test]
    async fn test_upload_media_sends_multipart() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        let upload = server
            .mock("POST", "/api/library")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="files"; filename="menu.png""#.to_string()),
                Matcher::Regex("Lobby,auto".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"files":[{"mediaId":42,"name":"menu","fileSize":4}]}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.png");
        std::fs::File::create(&path).unwrap().write_all(b"\x89PNG").unwrap();

        let media = client(&server)
            .upload_media(&path, "menu", Some("image/png"), Some("Lobby,auto"))
            .await
            .unwrap();
        upload.assert_async().await;
        assert_eq!(media.media_id, 42);
        assert_eq!(media.name, "menu");
    }

    #[tokio::test]
    async fn test_upload_rejected_in_body() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("POST", "/api/library")
            .with_status(200)
            .with_body(r#"{"files":[{"name":"menu","error":"File type not allowed"}]}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("menu.exe");
        std::fs::write(&path, b"MZ").unwrap();

        let err = client(&server)
            .upload_media(&path, "menu", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::InvalidResponse(ref m) if m.contains("not allowed")));
    }

    #[tokio::test]
    async fn test_find_resolution_matches_geometry() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/api/resolution")
            .with_status(200)
            .with_body(
                r#"[{"resolutionId":1,"resolution":"1080p HD Landscape","width":1920,"height":1080},
                    {"resolutionId":2,"resolution":"1080p HD Portrait","width":1080,"height":1920}]"#,
            )
            .create_async()
            .await;

        let client = client(&server);
        assert_eq!(client.find_resolution(1080, 1920).await.unwrap(), Some(2));
        assert_eq!(client.find_resolution(800, 600).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_displays_filters_by_name() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        let search = server
            .mock("GET", "/api/display")
            .match_query(Matcher::UrlEncoded("display".into(), "Lobby Screen".into()))
            .with_status(200)
            .with_body(r#"[{"displayId":3,"display":"Lobby Screen","displayGroupId":5}]"#)
            .create_async()
            .await;

        let displays = client(&server).search_displays("Lobby Screen").await.unwrap();
        search.assert_async().await;
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].display_group_id, Some(5));
    }

    #[tokio::test]
    async fn test_create_schedule_form_fields() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        let schedule = server
            .mock("POST", "/api/schedule")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("name".into(), "Auto-scheduled: Lobby".into()),
                Matcher::UrlEncoded("eventTypeId".into(), "7".into()),
                Matcher::UrlEncoded("fromDt".into(), "2024-05-07 09:00:00".into()),
                Matcher::UrlEncoded("toDt".into(), "2024-05-08 09:00:00".into()),
                Matcher::UrlEncoded("fullScreenCampaignId".into(), "31".into()),
                Matcher::UrlEncoded("isPriority".into(), "1".into()),
                Matcher::UrlEncoded("displayGroupIds[0]".into(), "5".into()),
            ]))
            .with_status(201)
            .with_body(r#"{"eventId":900}"#)
            .create_async()
            .await;

        let from = NaiveDate::from_ymd_opt(2024, 5, 7)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let to = from + chrono::Duration::hours(24);
        let entry = client(&server)
            .create_schedule(31, 5, "Auto-scheduled: Lobby", from, to)
            .await
            .unwrap();
        schedule.assert_async().await;
        assert_eq!(entry.event_id, 900);
        assert!(entry.is_priority);
    }

    #[tokio::test]
    async fn test_schedules_for_group_filters_by_group() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("GET", "/api/schedule")
            .match_query(Matcher::UrlEncoded("displayGroupIds[]".into(), "5".into()))
            .with_status(200)
            .with_body(
                r#"[{"eventId":1,"name":"Auto-scheduled: Lobby","isPriority":1},
                    {"eventId":2,"name":null,"isPriority":0}]"#,
            )
            .create_async()
            .await;

        let entries = client(&server).schedules_for_group(5).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_priority);
        assert_eq!(entries[1].name, "");
    }
}
