use anyhow::Result;

use crate::api::{EmailListResponse, MessageViewResponse, ScanResponse};
use crate::db::models::{HiddenEntry, User};
use crate::db::DatabaseStats;

pub fn format_listing(listing: &EmailListResponse) -> Result<String> {
    Ok(serde_json::to_string_pretty(listing)?)
}

pub fn format_message(view: &MessageViewResponse) -> Result<String> {
    Ok(serde_json::to_string_pretty(view)?)
}

pub fn format_scan(scan: &ScanResponse) -> Result<String> {
    Ok(serde_json::to_string_pretty(scan)?)
}

pub fn format_hidden(entries: &[HiddenEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

pub fn format_users(users: &[User]) -> Result<String> {
    Ok(serde_json::to_string_pretty(users)?)
}

pub fn format_stats(stats: &DatabaseStats) -> Result<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}
