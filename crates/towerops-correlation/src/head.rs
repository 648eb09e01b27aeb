//! The "first email in conversation" heuristic.
//!
//! Mail clients and gateways produce unreliable threading headers, so
//! deciding whether a message opens a conversation is a heuristic, not a
//! proof. A thread that starts with a reply to a message we never saw will
//! not open an incident; that precision/recall tradeoff is kept on purpose
//! rather than silently "fixed".

use std::collections::HashSet;

/// Auto-generated in-reply-to markers that do not point at a real parent.
const PLACEHOLDER_PARENTS: [&str; 3] = ["<null>", "<0>", "<none>"];

/// Decide whether a message is the head of its conversation.
///
/// `known_ids` is the set of `Message-ID`s our system has seen or sent;
/// references into foreign, never-seen conversations do not make a message
/// a continuation for us.
#[must_use]
pub fn is_conversation_head(
    message_id: &str,
    reply_to_id: Option<&str>,
    references: &[String],
    known_ids: &HashSet<String>,
) -> bool {
    let reply_to = reply_to_id.map(str::trim).filter(|s| !s.is_empty());

    // No threading headers at all.
    if reply_to.is_none() && references.is_empty() {
        return true;
    }

    // A reply header without a references chain is not a real thread.
    if references.is_empty() {
        return true;
    }

    // In-Reply-To pointing at the message itself.
    if let Some(parent) = reply_to {
        if parent == message_id.trim() {
            return true;
        }

        // Auto-generated or placeholder parent markers.
        let lowered = parent.to_lowercase();
        if lowered.starts_with("<auto-") || PLACEHOLDER_PARENTS.contains(&lowered.as_str()) {
            return true;
        }
    }

    // References consisting only of the message's own id.
    if references.len() == 1 && references[0].trim() == message_id.trim() {
        return true;
    }

    // A reply into a conversation we know is a continuation; references
    // that all point at foreign messages make it the first one for us.
    if !known_ids.is_empty() {
        if references
            .iter()
            .any(|r| known_ids.contains(r.trim()))
        {
            return false;
        }
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn bare_message_is_head() {
        assert!(is_conversation_head("<a@x>", None, &[], &known(&[])));
    }

    #[test]
    fn reply_without_references_is_head() {
        assert!(is_conversation_head(
            "<a@x>",
            Some("<parent@x>"),
            &[],
            &known(&["<parent@x>"])
        ));
    }

    #[test]
    fn self_referential_reply_is_head() {
        assert!(is_conversation_head(
            "<a@x>",
            Some("<a@x>"),
            &["<other@x>".into()],
            &known(&[])
        ));
    }

    #[test]
    fn auto_generated_parent_is_head() {
        for marker in ["<auto-12345@relay>", "<AUTO-zzz>", "<null>", "<0>", "<none>"] {
            assert!(
                is_conversation_head("<a@x>", Some(marker), &["<b@x>".into()], &known(&[])),
                "marker {marker} should mark a head"
            );
        }
    }

    #[test]
    fn references_of_only_self_is_head() {
        assert!(is_conversation_head(
            "<a@x>",
            Some("<b@x>"),
            &["<a@x>".into()],
            &known(&[])
        ));
    }

    #[test]
    fn reply_into_known_conversation_is_continuation() {
        assert!(!is_conversation_head(
            "<b@x>",
            Some("<a@x>"),
            &["<a@x>".into()],
            &known(&["<a@x>"])
        ));
    }

    #[test]
    fn reply_into_foreign_conversation_is_head_for_us() {
        assert!(is_conversation_head(
            "<b@x>",
            Some("<external@elsewhere>"),
            &["<external@elsewhere>".into()],
            &known(&["<ours@x>"])
        ));
    }

    #[test]
    fn referenced_reply_with_nothing_known_is_continuation() {
        // No local mail at all yet: a threaded message cannot prove it is
        // first, so it waits for its head.
        assert!(!is_conversation_head(
            "<b@x>",
            Some("<a@x>"),
            &["<a@x>".into()],
            &known(&[])
        ));
    }
}
