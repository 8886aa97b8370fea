use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Source provider types
///
/// Selected by the `copy_from.provider` configuration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceProvider {
    Nextcloud,
}

impl FromStr for SourceProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nextcloud" => Ok(SourceProvider::Nextcloud),
            _ => Err(anyhow::anyhow!("Invalid source provider: {}", s)),
        }
    }
}

impl Display for SourceProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SourceProvider::Nextcloud => write!(f, "nextcloud"),
        }
    }
}

/// Destination (signage CMS) provider types
///
/// Selected by the `project_to.provider` configuration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkProvider {
    Xibo,
}

impl FromStr for SinkProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xibo" => Ok(SinkProvider::Xibo),
            _ => Err(anyhow::anyhow!("Invalid destination provider: {}", s)),
        }
    }
}

impl Display for SinkProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SinkProvider::Xibo => write!(f, "xibo"),
        }
    }
}
