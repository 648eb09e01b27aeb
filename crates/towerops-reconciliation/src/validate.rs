//! Validation gate for remote-claimed fields.
//!
//! Dispatchers type codes into the tracker by hand, so claims are matched
//! exactly first and by unique prefix second; an ambiguous prefix is an
//! error asking them to be more specific. Every failure carries the
//! operator-facing reason pushed back to the issue as a comment.

use std::collections::HashMap;

use towerops_db::{Equipment, Site};

use crate::cache::DirectoryCache;

const MAX_EXAMPLES: usize = 3;

/// Resolve a claimed site code to a canonical registry code.
pub fn resolve_site(claim: &str, sites: &HashMap<String, Site>) -> Result<String, String> {
    if sites.contains_key(claim) {
        return Ok(claim.to_string());
    }

    let mut matching: Vec<&str> = sites
        .keys()
        .filter(|code| code.starts_with(claim))
        .map(String::as_str)
        .collect();
    matching.sort_unstable();

    match matching.len() {
        0 => Err(format!("No site found starting with \"{claim}\"")),
        1 => Ok(matching[0].to_string()),
        n => {
            let examples = matching[..MAX_EXAMPLES.min(n)].join(", ");
            Err(format!(
                "Found {n} sites starting with \"{claim}\". \
                 Examples: {examples}. Specify the full site code."
            ))
        }
    }
}

/// Resolve a claimed equipment name, checking consistency with a claimed
/// site when both are present.
pub fn resolve_equipment(
    claim: &str,
    site_claim: Option<&str>,
    equipment: &HashMap<String, Equipment>,
) -> Result<Equipment, String> {
    if let Some(eq) = equipment.get(claim) {
        if let (Some(site_claim), Some(site_code)) = (site_claim, eq.site_code.as_deref()) {
            if !site_code.starts_with(site_claim) {
                return Err(format!(
                    "Equipment \"{}\" belongs to site \"{site_code}\", \
                     but site \"{site_claim}\" was specified",
                    eq.name
                ));
            }
        }
        return Ok(eq.clone());
    }

    let mut matching: Vec<&Equipment> = equipment
        .values()
        .filter(|eq| eq.name.starts_with(claim))
        .collect();

    if matching.is_empty() {
        return Err(format!("No equipment found starting with \"{claim}\""));
    }

    if let Some(site_claim) = site_claim {
        matching.retain(|eq| {
            eq.site_code
                .as_deref()
                .is_some_and(|code| code.starts_with(site_claim))
        });
        if matching.is_empty() {
            return Err(format!(
                "Equipment starting with \"{claim}\" exists, but none of it \
                 belongs to a site starting with \"{site_claim}\""
            ));
        }
    }

    matching.sort_unstable_by(|a, b| a.name.cmp(&b.name));

    if matching.len() > 1 {
        let examples: Vec<&str> = matching
            .iter()
            .take(MAX_EXAMPLES)
            .map(|eq| eq.name.as_str())
            .collect();
        return Err(format!(
            "Found {} equipment entries starting with \"{claim}\". \
             Examples: {}. Specify the full equipment name.",
            matching.len(),
            examples.join(", ")
        ));
    }

    Ok(matching[0].clone())
}

/// Map a remote assignee id to a local dispatcher username.
///
/// An unset assignee and a tracker user unknown to us both resolve to
/// "nobody"; a known tracker user who is not an active dispatcher is a
/// validation failure.
pub fn resolve_assignee(
    assignee_id: Option<i64>,
    cache: &DirectoryCache,
) -> Result<Option<String>, String> {
    let Some(id) = assignee_id else {
        return Ok(None);
    };

    let Some(login) = cache.tracker_users.get(&id) else {
        return Ok(None);
    };

    if cache.dispatchers.contains(login) {
        Ok(Some(login.clone()))
    } else {
        Err(format!(
            "Assignee \"{login}\" is not an active dispatcher"
        ))
    }
}

/// Check a claimed incident type against the registry.
pub fn resolve_incident_type(
    claim: Option<&str>,
    cache: &DirectoryCache,
) -> Result<Option<String>, String> {
    let Some(claim) = claim else {
        return Ok(None);
    };

    if cache.incident_types.contains_key(claim) {
        Ok(Some(claim.to_string()))
    } else {
        let mut valid: Vec<&str> = cache.incident_types.keys().map(String::as_str).collect();
        valid.sort_unstable();
        Err(format!(
            "Unknown incident type \"{claim}\". Valid values: {}",
            valid.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn site(code: &str) -> Site {
        Site {
            code: code.into(),
            region: None,
            address: None,
            latitude: None,
            longitude: None,
            contractor_name: None,
            contractor_emails: vec![],
        }
    }

    fn equipment_map(entries: &[(&str, Option<&str>)]) -> HashMap<String, Equipment> {
        entries
            .iter()
            .map(|(name, site)| {
                (
                    (*name).to_string(),
                    Equipment {
                        name: (*name).to_string(),
                        site_code: site.map(String::from),
                        operators: vec![],
                    },
                )
            })
            .collect()
    }

    fn sites_map(codes: &[&str]) -> HashMap<String, Site> {
        codes
            .iter()
            .map(|c| ((*c).to_string(), site(c)))
            .collect()
    }

    #[test]
    fn exact_site_match_wins() {
        let sites = sites_map(&["MSK-1", "MSK-12"]);
        assert_eq!(resolve_site("MSK-1", &sites).unwrap(), "MSK-1");
    }

    #[test]
    fn unique_prefix_resolves() {
        let sites = sites_map(&["MSK-12", "SPB-7"]);
        assert_eq!(resolve_site("MSK", &sites).unwrap(), "MSK-12");
    }

    #[test]
    fn ambiguous_prefix_is_rejected_with_examples() {
        let sites = sites_map(&["MSK-10", "MSK-11", "MSK-12", "MSK-13"]);
        let err = resolve_site("MSK-1", &sites).unwrap_err();
        assert!(err.contains("4 sites"));
        assert!(err.contains("MSK-10"));
    }

    #[test]
    fn unknown_site_is_rejected() {
        let sites = sites_map(&["MSK-1"]);
        assert!(resolve_site("UNKNOWN-999", &sites).is_err());
    }

    #[test]
    fn equipment_site_consistency_is_enforced() {
        let equipment = equipment_map(&[("BS-1", Some("MSK-1"))]);
        let err = resolve_equipment("BS-1", Some("SPB"), &equipment).unwrap_err();
        assert!(err.contains("belongs to site"));
    }

    #[test]
    fn equipment_prefix_filtered_by_site() {
        let equipment = equipment_map(&[("BS-10", Some("MSK-1")), ("BS-11", Some("SPB-7"))]);
        let resolved = resolve_equipment("BS-1", Some("SPB"), &equipment).unwrap();
        assert_eq!(resolved.name, "BS-11");
    }

    #[test]
    fn ambiguous_equipment_is_rejected() {
        let equipment = equipment_map(&[("BS-10", None), ("BS-11", None)]);
        assert!(resolve_equipment("BS-1", None, &equipment).is_err());
    }

    fn cache_with_users(users: &[(i64, &str)], dispatchers: &[&str]) -> DirectoryCache {
        DirectoryCache {
            sites: HashMap::new(),
            equipment: HashMap::new(),
            dispatchers: dispatchers.iter().map(|s| (*s).to_string()).collect::<HashSet<_>>(),
            incident_types: HashMap::new(),
            tracker_users: users
                .iter()
                .map(|(id, login)| (*id, (*login).to_string()))
                .collect(),
        }
    }

    #[test]
    fn known_dispatcher_assignee_resolves() {
        let cache = cache_with_users(&[(10, "alex")], &["alex"]);
        assert_eq!(resolve_assignee(Some(10), &cache).unwrap(), Some("alex".into()));
    }

    #[test]
    fn unknown_tracker_user_resolves_to_nobody() {
        let cache = cache_with_users(&[(10, "alex")], &["alex"]);
        assert_eq!(resolve_assignee(Some(99), &cache).unwrap(), None);
    }

    #[test]
    fn inactive_dispatcher_is_a_validation_failure() {
        let cache = cache_with_users(&[(10, "alex")], &[]);
        assert!(resolve_assignee(Some(10), &cache).is_err());
    }

    #[test]
    fn unset_assignee_is_valid() {
        let cache = cache_with_users(&[], &[]);
        assert_eq!(resolve_assignee(None, &cache).unwrap(), None);
    }
}
