//! Donor duplicate scoring.
//!
//! Used by the duplicate-check endpoint while an operator is keying a new
//! donor, and by the import pipeline. Scores are in `0.0..=1.0`.

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;
use uuid::Uuid;

const LAST_NAME_WEIGHT: f64 = 0.45;
const FIRST_NAME_WEIGHT: f64 = 0.25;
const ADDRESS_WEIGHT: f64 = 0.15;
const POSTAL_WEIGHT: f64 = 0.15;

/// Scores are never renormalised over less than the combined name weight,
/// so a lone surname match cannot reach a high score.
const MIN_WEIGHT: f64 = LAST_NAME_WEIGHT + FIRST_NAME_WEIGHT;

/// Similarity at which a field is reported as a match reason
const REASON_SIMILARITY: f64 = 0.9;

/// The donor fields that take part in matching
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DonorProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub postal_code: Option<String>,
    pub address1: Option<String>,
}

/// Why two donors were considered the same person
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Email,
    Name,
    Address,
    PostalCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub donor_id: Uuid,
    pub score: f64,
    pub reasons: Vec<MatchReason>,
}

/// Lowercase, drop punctuation, collapse whitespace. `None` when nothing is left.
pub fn normalize(s: &str) -> Option<String> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// First five digits of a postal code (ZIP+4 collapses to ZIP).
pub fn normalize_postal(s: &str) -> Option<String> {
    let digits: String = s.chars().filter(char::is_ascii_digit).take(5).collect();
    (!digits.is_empty()).then_some(digits)
}

pub fn normalize_email(s: &str) -> Option<String> {
    let e = s.trim().to_lowercase();
    (!e.is_empty()).then_some(e)
}

fn opt_norm(v: &Option<String>, f: fn(&str) -> Option<String>) -> Option<String> {
    v.as_deref().and_then(f)
}

/// Score a candidate against one existing donor.
pub fn score(candidate: &DonorProfile, existing: &DonorProfile) -> (f64, Vec<MatchReason>) {
    if let (Some(a), Some(b)) = (
        opt_norm(&candidate.email, normalize_email),
        opt_norm(&existing.email, normalize_email),
    ) {
        if a == b {
            return (1.0, vec![MatchReason::Email]);
        }
    }

    let mut reasons = Vec::new();
    let mut weighted = 0.0;
    let mut weight = 0.0;
    let mut name_sims = Vec::new();

    let text_fields = [
        (&candidate.last_name, &existing.last_name, LAST_NAME_WEIGHT),
        (&candidate.first_name, &existing.first_name, FIRST_NAME_WEIGHT),
    ];
    for (a, b, w) in text_fields {
        if let (Some(a), Some(b)) = (opt_norm(a, normalize), opt_norm(b, normalize)) {
            let sim = jaro_winkler(&a, &b);
            weighted += w * sim;
            weight += w;
            name_sims.push(sim);
        }
    }
    if !name_sims.is_empty() && name_sims.iter().all(|s| *s >= REASON_SIMILARITY) {
        reasons.push(MatchReason::Name);
    }

    if let (Some(a), Some(b)) = (
        opt_norm(&candidate.address1, normalize),
        opt_norm(&existing.address1, normalize),
    ) {
        let sim = jaro_winkler(&a, &b);
        weighted += ADDRESS_WEIGHT * sim;
        weight += ADDRESS_WEIGHT;
        if sim >= REASON_SIMILARITY {
            reasons.push(MatchReason::Address);
        }
    }

    if let (Some(a), Some(b)) = (
        opt_norm(&candidate.postal_code, normalize_postal),
        opt_norm(&existing.postal_code, normalize_postal),
    ) {
        weight += POSTAL_WEIGHT;
        if a == b {
            weighted += POSTAL_WEIGHT;
            reasons.push(MatchReason::PostalCode);
        }
    }

    if weight == 0.0 {
        return (0.0, Vec::new());
    }

    (weighted / weight.max(MIN_WEIGHT), reasons)
}

/// Rank existing donors that look like the candidate.
///
/// Returns matches scoring at least `threshold`, best first (ties broken
/// by donor id), at most `limit` of them.
pub fn find_duplicates(
    candidate: &DonorProfile,
    existing: &[(Uuid, DonorProfile)],
    threshold: f64,
    limit: usize,
) -> Vec<DuplicateMatch> {
    let mut matches: Vec<DuplicateMatch> = existing
        .iter()
        .filter_map(|(id, profile)| {
            let (score, reasons) = score(candidate, profile);
            (score >= threshold).then(|| DuplicateMatch {
                donor_id: *id,
                score,
                reasons,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.donor_id.cmp(&b.donor_id)));
    matches.truncate(limit);
    matches
}
