use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::api::{EmailListResponse, MessageViewResponse, ScanResponse};
use crate::classify::Verdict;
use crate::db::models::{HiddenEntry, User};
use crate::db::DatabaseStats;

const ID_WIDTH: usize = 18;
const FROM_WIDTH: usize = 24;
const SUBJECT_WIDTH: usize = 44;
const DATE_WIDTH: usize = 26;

pub fn format_listing(listing: &EmailListResponse) -> String {
    if listing.emails.is_empty() {
        return "No visible messages.".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<id$}  {:<from$}  {:<subject$}  {:<date$}\n",
        "ID",
        "From",
        "Subject",
        "Date",
        id = ID_WIDTH,
        from = FROM_WIDTH,
        subject = SUBJECT_WIDTH,
        date = DATE_WIDTH
    ));
    out.push_str(&format!(
        "{}  {}  {}  {}\n",
        "-".repeat(ID_WIDTH),
        "-".repeat(FROM_WIDTH),
        "-".repeat(SUBJECT_WIDTH),
        "-".repeat(DATE_WIDTH)
    ));

    for email in &listing.emails {
        out.push_str(&format!(
            "{:<id$}  {:<from$}  {:<subject$}  {:<date$}\n",
            truncate_for_width(&email.id, ID_WIDTH),
            truncate_for_width(&email.from, FROM_WIDTH),
            truncate_for_width(&email.subject, SUBJECT_WIDTH),
            truncate_for_width(&email.date, DATE_WIDTH),
            id = ID_WIDTH,
            from = FROM_WIDTH,
            subject = SUBJECT_WIDTH,
            date = DATE_WIDTH
        ));
    }

    out
}

pub fn format_message(view: &MessageViewResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("ID: {}\n", view.basic.id));
    out.push_str(&format!("Subject: {}\n", view.basic.subject));
    out.push_str(&format!("From: {}\n", view.basic.from));
    if !view.basic.to.is_empty() {
        out.push_str(&format!("To: {}\n", view.basic.to));
    }
    out.push_str(&format!("Date: {}\n", view.basic.date));

    out.push('\n');
    out.push_str("Body\n");
    out.push_str("----\n");
    out.push_str(&view.basic.body);
    if !view.basic.body.ends_with('\n') {
        out.push('\n');
    }

    if view.raw_mime_body.is_some() {
        out.push('\n');
        out.push_str("(raw MIME source available; use --json to include it)\n");
    }

    out
}

pub fn format_scan(scan: &ScanResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("Message: {}\n", scan.id));
    out.push_str(&format!(
        "Verdict: {}\n",
        colorize_verdict(scan.verdict)
    ));
    out.push_str(&format!("Confidence: {:.0}%\n", scan.confidence * 100.0));
    if let Some(details) = &scan.details {
        out.push_str(&format!("Details: {details}\n"));
    }
    out
}

pub fn format_hidden(entries: &[HiddenEntry]) -> String {
    if entries.is_empty() {
        return "No hidden messages.".to_string();
    }

    let mut out = String::new();
    out.push_str("Message ID          Hidden At\n");
    out.push_str("------------------  --------------------\n");
    for entry in entries {
        out.push_str(&format!(
            "{:<18}  {}\n",
            truncate_for_width(&entry.message_id, 18),
            entry.hidden_at.as_deref().unwrap_or("-")
        ));
    }
    out
}

pub fn format_users(users: &[User]) -> String {
    if users.is_empty() {
        return "No users registered.".to_string();
    }

    let mut out = String::new();
    out.push_str("Email                       Name                  Since\n");
    out.push_str("--------------------------  --------------------  --------------------\n");
    for user in users {
        out.push_str(&format!(
            "{:<26}  {:<20}  {}\n",
            truncate_for_width(&user.email_address, 26),
            truncate_for_width(user.display_name.as_deref().unwrap_or("-"), 20),
            user.created_at
        ));
    }
    out
}

pub fn format_stats(stats: &DatabaseStats) -> String {
    let mut out = String::new();
    out.push_str("Lurebox Stats\n");
    out.push_str("=============\n");
    out.push_str(&format!("Users:            {}\n", stats.total_users));
    out.push_str(&format!(
        "With credentials: {}\n",
        stats.users_with_credentials
    ));
    out.push_str(&format!(
        "Hidden messages:  {}\n",
        stats.total_hidden_messages
    ));
    out
}

fn colorize_verdict(verdict: Verdict) -> String {
    match verdict {
        Verdict::Phishing => format!("\u{1b}[31m{verdict}\u{1b}[0m"),
        Verdict::Safe => format!("\u{1b}[32m{verdict}\u{1b}[0m"),
        Verdict::Unknown => format!("\u{1b}[33m{verdict}\u{1b}[0m"),
    }
}

fn truncate_for_width(value: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(value) <= max_width {
        return value.to_string();
    }

    if max_width <= 1 {
        return "…".to_string();
    }

    let mut out = String::new();
    let mut width = 0usize;
    for c in value.chars() {
        let cw = UnicodeWidthChar::width(c).unwrap_or(0);
        if width + cw + 1 > max_width {
            break;
        }
        out.push(c);
        width += cw;
    }
    out.push('…');
    out
}
