//! Signage publish workflow
//!
//! Turns one downloaded file into the content shown on the configured display.
//! The work is a fixed sequence of named [`PublishStage`]s; each stage reads what
//! earlier stages produced from a [`PublishReport`] and records its own result there,
//! so a failure can be attributed to exactly one stage.
//!
//! Fatal stages abort the run with a [`SyncError`] tagged with that stage. Retiring
//! old schedules and refreshing the display are best-effort: their failures are
//! kept as [`StageWarning`]s and the publish still succeeds.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use marquee_core::{
    Config, DisplayGroupRef, MediaRef, Presentation, PublishStage, ScheduleEntry, ScheduleMarker,
    SinkProvider, SourceEntry, SyncError,
};
use std::path::Path;
use std::time::Instant;

use crate::{CmsError, XiboClient};

/// Publish destination abstraction
///
/// The control loop hands over a downloaded file and gets back either a report of
/// what was created or the error of the stage that failed.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Authenticate and resolve the target display without changing anything.
    async fn check(&self) -> Result<DisplayGroupRef, SyncError>;

    /// Publish the file at `local_path` (downloaded from `entry`) to the target display.
    async fn publish(&self, entry: &SourceEntry, local_path: &Path) -> Result<PublishReport, SyncError>;

    /// Get the destination provider type
    fn provider(&self) -> SinkProvider;
}

/// What a publish needs to know about the target display and scheduling.
#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    pub background_color: String,
    pub schedule_duration: Duration,
    pub timezone: Tz,
    pub tags: Option<String>,
    pub marker: ScheduleMarker,
}

impl PublishSettings {
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let destination = &config.project_to;
        Ok(Self {
            display_name: destination.display.name.clone(),
            width: destination.display.width,
            height: destination.display.height,
            background_color: destination.display.background_color.clone(),
            schedule_duration: Duration::hours(i64::from(destination.schedule_duration_hours)),
            timezone: config.cms_timezone()?,
            tags: destination.tags.clone().filter(|t| !t.trim().is_empty()),
            marker: config.marker(),
        })
    }
}

/// A best-effort stage that failed without failing the publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    pub stage: PublishStage,
    pub message: String,
}

/// Per-stage results of one publish run.
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub media: Option<MediaRef>,
    pub presentation: Option<Presentation>,
    pub display_group: Option<DisplayGroupRef>,
    pub schedule: Option<ScheduleEntry>,
    /// Old auto-created schedule events removed from the display group
    pub retired: Vec<i64>,
    pub completed: Vec<(PublishStage, std::time::Duration)>,
    pub warnings: Vec<StageWarning>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Xibo implementation of [`ContentSink`].
#[derive(Debug, Clone)]
pub struct SignagePublisher {
    client: XiboClient,
    settings: PublishSettings,
}

fn stage_error(stage: PublishStage, err: CmsError) -> SyncError {
    let err = anyhow::Error::new(err);
    match stage {
        PublishStage::Authenticate => SyncError::AuthFailed(err),
        PublishStage::UploadMedia => SyncError::UploadFailed(err),
        PublishStage::CreatePresentation => SyncError::PresentationFailed(err),
        PublishStage::ResolveDisplayGroup => SyncError::DisplayNotFound {
            name: String::new(),
            reason: err.to_string(),
        },
        PublishStage::ScheduleNew => SyncError::ScheduleFailed(err),
        PublishStage::RetireOldSchedules => SyncError::RetireFailed(err),
        PublishStage::RefreshDisplay => SyncError::RefreshFailed(err),
    }
}

/// Result of an earlier stage that a later one depends on.
fn required<'a, T>(value: &'a Option<T>, stage: PublishStage, what: &str) -> Result<&'a T, SyncError> {
    value.as_ref().ok_or_else(|| {
        stage_error(
            stage,
            CmsError::InvalidResponse(format!("no {} available for this stage", what)),
        )
    })
}

impl SignagePublisher {
    pub fn new(client: XiboClient, settings: PublishSettings) -> Self {
        Self { client, settings }
    }

    pub fn client(&self) -> &XiboClient {
        &self.client
    }

    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Look up the display group for the configured display name.
    ///
    /// The CMS is asked for displays containing the name; the result is then matched
    /// exactly, ignoring case. No match and several matches are both reported as
    /// [`SyncError::DisplayNotFound`].
    pub async fn resolve_display_group(&self) -> Result<DisplayGroupRef, SyncError> {
        let name = &self.settings.display_name;
        let not_found = |reason: String| SyncError::DisplayNotFound {
            name: name.clone(),
            reason,
        };

        let displays = self
            .client
            .search_displays(name)
            .await
            .map_err(|e| not_found(format!("display lookup failed: {}", e)))?;

        let wanted = name.to_lowercase();
        let mut matches: Vec<_> = displays
            .into_iter()
            .filter(|d| d.display.to_lowercase() == wanted)
            .collect();

        let display = match matches.len() {
            0 => return Err(not_found("no display with this name".to_string())),
            1 => matches.remove(0),
            n => {
                return Err(not_found(format!(
                    "ambiguous: {} displays share this name",
                    n
                )))
            }
        };

        let display_group_id = match display.display_group_id {
            Some(id) => id,
            None => self
                .client
                .display_specific_group(display.display_id)
                .await
                .map_err(|e| not_found(format!("display group lookup failed: {}", e)))?
                .ok_or_else(|| not_found("display has no display group".to_string()))?,
        };

        Ok(DisplayGroupRef {
            display_group_id,
            display_id: display.display_id,
            display_name: display.display,
        })
    }

    async fn run_stage(
        &self,
        stage: PublishStage,
        entry: &SourceEntry,
        local_path: &Path,
        report: &mut PublishReport,
    ) -> Result<(), SyncError> {
        match stage {
            PublishStage::Authenticate => self
                .client
                .authenticate()
                .await
                .map_err(|e| stage_error(stage, e)),

            PublishStage::UploadMedia => {
                let media = self
                    .client
                    .upload_media(
                        local_path,
                        entry.stem(),
                        entry.content_type.as_deref(),
                        self.settings.tags.as_deref(),
                    )
                    .await
                    .map_err(|e| stage_error(stage, e))?;
                tracing::info!(media_id = media.media_id, "Uploaded media");
                report.media = Some(media);
                Ok(())
            }

            PublishStage::CreatePresentation => {
                let media = required(&report.media, stage, "uploaded media")?;
                let resolution_id = match self
                    .client
                    .find_resolution(self.settings.width, self.settings.height)
                    .await
                {
                    Ok(Some(id)) => Some(id),
                    Ok(None) => {
                        tracing::warn!(
                            width = self.settings.width,
                            height = self.settings.height,
                            "No CMS resolution matches the display geometry, using the CMS default"
                        );
                        None
                    }
                    Err(e) => return Err(stage_error(stage, e)),
                };

                let name = self
                    .settings
                    .marker
                    .layout_name(&self.settings.display_name, &entry.name);
                let presentation = self
                    .client
                    .create_fullscreen_layout(
                        media.media_id,
                        &name,
                        resolution_id,
                        &self.settings.background_color,
                    )
                    .await
                    .map_err(|e| {
                        tracing::warn!(
                            media_id = media.media_id,
                            "Uploaded media is left in the library without a layout"
                        );
                        stage_error(stage, e)
                    })?;
                tracing::info!(
                    layout_id = presentation.layout_id,
                    campaign_id = presentation.campaign_id,
                    "Created full-screen layout"
                );
                report.presentation = Some(presentation);
                Ok(())
            }

            PublishStage::ResolveDisplayGroup => {
                let group = self.resolve_display_group().await?;
                tracing::debug!(display_group_id = group.display_group_id, "Resolved display group");
                report.display_group = Some(group);
                Ok(())
            }

            PublishStage::ScheduleNew => {
                let presentation = required(&report.presentation, stage, "presentation")?;
                let group = required(&report.display_group, stage, "display group")?;

                let from = Utc::now().with_timezone(&self.settings.timezone).naive_local();
                let to = from + self.settings.schedule_duration;
                let name = self.settings.marker.schedule_name(&self.settings.display_name);

                let schedule = self
                    .client
                    .create_schedule(presentation.campaign_id, group.display_group_id, &name, from, to)
                    .await
                    .map_err(|e| stage_error(stage, e))?;
                tracing::info!(event_id = schedule.event_id, from = %from, to = %to, "Scheduled new content");
                report.schedule = Some(schedule);
                Ok(())
            }

            PublishStage::RetireOldSchedules => {
                let group = required(&report.display_group, stage, "display group")?;
                let keep = report.schedule.as_ref().map(|s| s.event_id);

                let existing = self
                    .client
                    .schedules_for_group(group.display_group_id)
                    .await
                    .map_err(|e| stage_error(stage, e))?;

                let stale: Vec<i64> = existing
                    .into_iter()
                    .filter(|s| Some(s.event_id) != keep)
                    .filter(|s| self.settings.marker.is_auto_schedule(&s.name))
                    .map(|s| s.event_id)
                    .collect();

                let mut failed = Vec::new();
                for event_id in stale {
                    match self.client.delete_schedule(event_id).await {
                        Ok(()) => report.retired.push(event_id),
                        Err(e) => {
                            tracing::warn!(event_id = event_id, error = %e, "Failed to delete old schedule");
                            failed.push(event_id);
                        }
                    }
                }

                tracing::info!(retired = report.retired.len(), "Retired old auto-created schedules");
                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(SyncError::RetireFailed(anyhow::anyhow!(
                        "could not delete old schedule events {:?}",
                        failed
                    )))
                }
            }

            PublishStage::RefreshDisplay => {
                let group = required(&report.display_group, stage, "display group")?;
                self.client
                    .collect_now(group.display_group_id)
                    .await
                    .map_err(|e| stage_error(stage, e))
            }
        }
    }
}

#[async_trait]
impl ContentSink for SignagePublisher {
    async fn check(&self) -> Result<DisplayGroupRef, SyncError> {
        self.client
            .authenticate()
            .await
            .map_err(|e| stage_error(PublishStage::Authenticate, e))?;

        let about = self
            .client
            .about()
            .await
            .map_err(|e| stage_error(PublishStage::Authenticate, e))?;
        tracing::info!(
            cms = %self.client.base_url(),
            version = about.get("version").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "Connected to CMS"
        );

        self.resolve_display_group().await
    }

    #[tracing::instrument(skip(self, entry, local_path), fields(file = %entry.name, display = %self.settings.display_name))]
    async fn publish(&self, entry: &SourceEntry, local_path: &Path) -> Result<PublishReport, SyncError> {
        let mut report = PublishReport::default();

        for stage in PublishStage::ALL {
            let started = Instant::now();
            match self.run_stage(stage, entry, local_path, &mut report).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    tracing::debug!(stage = %stage, elapsed_ms = elapsed.as_millis() as u64, "Stage complete");
                    report.completed.push((stage, elapsed));
                }
                Err(e) if stage.is_fatal() => {
                    tracing::error!(stage = %stage, error = %e, "Publish stage failed");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(stage = %stage, error = %e, "Best-effort stage failed, continuing");
                    report.warnings.push(StageWarning {
                        stage,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn provider(&self) -> SinkProvider {
        SinkProvider::Xibo
    }
}
