//! Lifecycle enums shared by the store, the pipeline and the HTTP surface.
//!
//! Each enum is persisted as a TEXT column and serialized as the same string
//! over the API, so the column value and the JSON value never diverge.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("invalid {} value: {}", stringify!($name), text).into(),
                    )
                })
            }
        }
    };
}

text_enum! {
    /// Lifecycle of a background import.
    SyncJobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

impl SyncJobStatus {
    /// `pending` and `running` jobs block new jobs for the same user.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

text_enum! {
    /// Which providers a sync job imports from.
    SyncJobKind {
        Full => "full",
        Gmail => "gmail",
        Calendar => "calendar",
    }
}

impl SyncJobKind {
    pub fn includes_gmail(&self) -> bool {
        matches!(self, Self::Full | Self::Gmail)
    }

    pub fn includes_calendar(&self) -> bool {
        matches!(self, Self::Full | Self::Calendar)
    }
}

text_enum! {
    /// Position of a thread in the resolve → analyze pipeline.
    ProcessingStage {
        Pending => "pending",
        ResolvingEntities => "resolving_entities",
        Queued => "queued",
        Analyzing => "analyzing",
        Completed => "completed",
        Failed => "failed",
    }
}

text_enum! {
    NextStepStatus {
        Pending => "pending",
        Completed => "completed",
    }
}

text_enum! {
    FeatureRequestStatus {
        New => "new",
        UnderReview => "under_review",
        Planned => "planned",
        Shipped => "shipped",
        Declined => "declined",
    }
}

text_enum! {
    Urgency {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
}

impl Urgency {
    /// Map whatever the model produced onto the three levels; unknown → Low.
    pub fn normalize(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => Self::High,
            Some("medium") => Self::Medium,
            Some("low") => Self::Low,
            other => {
                if let Some(raw) = other {
                    log::warn!("Invalid urgency '{}', defaulting to 'Low'", raw);
                }
                Self::Low
            }
        }
    }
}

text_enum! {
    /// Mirror of the recording bot's state on a meeting row.
    BotStatus {
        None => "none",
        Scheduled => "scheduled",
        Recording => "recording",
        Processing => "processing",
        Completed => "completed",
        Cancelled => "cancelled",
        Failed => "failed",
    }
}

impl BotStatus {
    /// A bot exists on the provider side and can still be cancelled.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Recording | Self::Processing)
    }
}

text_enum! {
    CompanyStatus {
        Active => "active",
        AtRisk => "at_risk",
        Churned => "churned",
        Prospect => "prospect",
    }
}

text_enum! {
    CustomerStatus {
        Prospect => "prospect",
        Active => "active",
        Churned => "churned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_round_trips_through_strings() {
        assert_eq!(ProcessingStage::ResolvingEntities.as_str(), "resolving_entities");
        assert_eq!(
            ProcessingStage::parse("resolving_entities"),
            Some(ProcessingStage::ResolvingEntities)
        );
        assert_eq!(ProcessingStage::parse("imported"), None);
        assert_eq!(
            serde_json::to_string(&FeatureRequestStatus::UnderReview).unwrap(),
            "\"under_review\""
        );
    }

    #[test]
    fn test_urgency_normalize() {
        assert_eq!(Urgency::normalize(Some("High")), Urgency::High);
        assert_eq!(Urgency::normalize(Some(" medium ")), Urgency::Medium);
        assert_eq!(Urgency::normalize(Some("Critical")), Urgency::Low);
        assert_eq!(Urgency::normalize(None), Urgency::Low);
    }

    #[test]
    fn test_active_sync_statuses() {
        assert!(SyncJobStatus::Pending.is_active());
        assert!(SyncJobStatus::Running.is_active());
        assert!(!SyncJobStatus::Completed.is_active());
        assert!(!SyncJobStatus::Failed.is_active());
    }

    #[test]
    fn test_sync_kind_coverage() {
        assert!(SyncJobKind::Full.includes_gmail() && SyncJobKind::Full.includes_calendar());
        assert!(!SyncJobKind::Gmail.includes_calendar());
        assert!(!SyncJobKind::Calendar.includes_gmail());
    }
}
