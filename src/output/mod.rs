pub mod json;
pub mod table;

use anyhow::Result;

use crate::api::{EmailListResponse, MessageViewResponse, ScanResponse};
use crate::db::models::{HiddenEntry, User};
use crate::db::DatabaseStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_listing(format: OutputFormat, listing: &EmailListResponse) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_listing(listing)),
        OutputFormat::Json => json::format_listing(listing),
    }
}

pub fn format_message(format: OutputFormat, view: &MessageViewResponse) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_message(view)),
        OutputFormat::Json => json::format_message(view),
    }
}

pub fn format_scan(format: OutputFormat, scan: &ScanResponse) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_scan(scan)),
        OutputFormat::Json => json::format_scan(scan),
    }
}

pub fn format_hidden(format: OutputFormat, entries: &[HiddenEntry]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_hidden(entries)),
        OutputFormat::Json => json::format_hidden(entries),
    }
}

pub fn format_users(format: OutputFormat, users: &[User]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_users(users)),
        OutputFormat::Json => json::format_users(users),
    }
}

pub fn format_stats(format: OutputFormat, stats: &DatabaseStats) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_stats(stats)),
        OutputFormat::Json => json::format_stats(stats),
    }
}
