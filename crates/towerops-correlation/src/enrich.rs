//! Site/equipment code extraction from mail text.

use towerops_db::MailMessage;

/// The longest known code appearing verbatim in the text.
///
/// Operators paste codes into free-form subjects and bodies, and codes can
/// be prefixes of one another ("MSK-1" vs "MSK-12"), so the longest match
/// wins when several candidates parse.
#[must_use]
pub fn longest_code_match(text: &str, known_codes: &[&str]) -> Option<String> {
    known_codes
        .iter()
        .filter(|code| !code.is_empty() && text.contains(*code))
        .max_by_key(|code| code.len())
        .map(|code| (*code).to_string())
}

/// Scan a thread for a known code: every subject first, then every body.
#[must_use]
pub fn extract_code_from_thread(thread: &[MailMessage], known_codes: &[&str]) -> Option<String> {
    for msg in thread {
        if let Some(subject) = &msg.subject {
            if let Some(code) = longest_code_match(subject, known_codes) {
                return Some(code);
            }
        }
    }
    for msg in thread {
        if let Some(body) = &msg.body {
            if let Some(code) = longest_code_match(body, known_codes) {
                return Some(code);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use towerops_core::MailId;

    fn msg(subject: Option<&str>, body: Option<&str>) -> MailMessage {
        MailMessage {
            id: MailId::new(1),
            message_id: "<a@x>".into(),
            reply_to_id: None,
            references: vec![],
            subject: subject.map(String::from),
            body: body.map(String::from),
            sender: "op@example.com".into(),
            recipients_to: vec![],
            recipients_cc: vec![],
            received_at: Utc::now(),
            folder: "INBOX".into(),
            is_thread_head: true,
            from_tracker: false,
            mirrored_to_tracker: false,
            incident_id: None,
        }
    }

    #[test]
    fn longest_candidate_wins() {
        let codes = ["MSK-1", "MSK-12", "SPB-7"];
        assert_eq!(
            longest_code_match("outage at MSK-12 site", &codes),
            Some("MSK-12".to_string())
        );
    }

    #[test]
    fn subject_beats_body() {
        let codes = ["MSK-1", "SPB-7"];
        let thread = vec![msg(Some("alarm SPB-7"), Some("previously MSK-1"))];
        assert_eq!(
            extract_code_from_thread(&thread, &codes),
            Some("SPB-7".to_string())
        );
    }

    #[test]
    fn later_message_body_is_still_found() {
        let codes = ["MSK-1"];
        let thread = vec![
            msg(Some("outage report"), None),
            msg(None, Some("the site is MSK-1, crew dispatched")),
        ];
        assert_eq!(
            extract_code_from_thread(&thread, &codes),
            Some("MSK-1".to_string())
        );
    }

    #[test]
    fn unknown_text_matches_nothing() {
        let codes = ["MSK-1"];
        let thread = vec![msg(Some("no codes here"), Some("still nothing"))];
        assert_eq!(extract_code_from_thread(&thread, &codes), None);
    }
}
