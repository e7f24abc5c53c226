// ⚖️ Founder Set Differ
// Canonical founder lines ("Name - INN - date"), set difference in both
// directions and deterministic serialization for the stored columns.

use crate::founders::FounderRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Separator between the fields of a canonical founder line
pub const FIELD_SEPARATOR: &str = " - ";

// ============================================================================
// CANONICAL LINE
// ============================================================================

/// Render one founder as its canonical line
///
/// Records without a registration date render as `Name - INN` so the line
/// stays stable after the trim applied when stored text is read back.
pub fn canonical_line(record: &FounderRecord) -> String {
    let name = title_case(&record.full_name());
    match record.latest_registration_date.as_deref().map(str::trim) {
        Some(date) if !date.is_empty() => {
            format!("{name}{sep}{}{sep}{date}", record.tax_id, sep = FIELD_SEPARATOR)
        }
        _ => format!("{name}{FIELD_SEPARATOR}{}", record.tax_id),
    }
}

/// Uppercase the first letter of every word, lowercase the rest.
/// Any non-alphabetic character starts a new word ("РИМСКИЙ-КОРСАКОВ" →
/// "Римский-Корсаков").
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;

    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }

    out
}

/// Structured identity of a founder line: INN plus normalized name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FounderKey {
    pub tax_id: String,
    pub name: String,
}

impl FounderKey {
    /// Parse the key out of a canonical line; `None` when the line has no INN field
    pub fn from_line(line: &str) -> Option<Self> {
        let mut fields = line.split(FIELD_SEPARATOR);
        let name = fields.next()?.trim();
        let tax_id = fields.next()?.trim();
        if tax_id.is_empty() {
            return None;
        }
        Some(FounderKey {
            tax_id: tax_id.to_string(),
            name: name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        })
    }
}

// ============================================================================
// FOUNDER SET
// ============================================================================

/// Set of canonical founder lines, ordered so serialization is deterministic
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderSet {
    lines: BTreeSet<String>,
}

impl FounderSet {
    pub fn new() -> Self {
        FounderSet::default()
    }

    /// Canonicalize freshly extracted founders
    pub fn from_records(records: &[FounderRecord]) -> Self {
        records.iter().map(canonical_line).collect()
    }

    /// Read stored text: one canonical line per row, blanks dropped
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Sorted, newline-joined
    pub fn serialize(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    pub fn insert(&mut self, line: String) -> bool {
        self.lines.insert(line)
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.contains(line)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.lines.iter()
    }

    /// Lines in `self` that are not in `other`
    pub fn difference(&self, other: &FounderSet) -> FounderSet {
        self.lines.difference(&other.lines).cloned().collect()
    }

    pub fn union(&self, other: &FounderSet) -> FounderSet {
        self.lines.union(&other.lines).cloned().collect()
    }

    pub fn intersection(&self, other: &FounderSet) -> FounderSet {
        self.lines.intersection(&other.lines).cloned().collect()
    }

    /// Keys present in this set
    pub fn keys(&self) -> BTreeSet<FounderKey> {
        self.lines.iter().filter_map(|l| FounderKey::from_line(l)).collect()
    }

    /// Lines whose key is not in `keys`
    pub fn without_keys(&self, keys: &BTreeSet<FounderKey>) -> FounderSet {
        self.lines
            .iter()
            .filter(|line| FounderKey::from_line(line).map_or(true, |key| !keys.contains(&key)))
            .cloned()
            .collect()
    }
}

impl FromIterator<String> for FounderSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        FounderSet {
            lines: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// DIFF
// ============================================================================

/// Founder whose attributes changed between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderChange {
    pub key: FounderKey,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderDiff {
    /// new − old
    pub added: FounderSet,
    /// old − new
    pub removed: FounderSet,
}

impl FounderDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Added/removed pairs that share a key: the same founder whose date or
    /// name rendering moved. They still appear in `added` and `removed`.
    pub fn changed(&self) -> Vec<FounderChange> {
        let mut changes = Vec::new();
        for before in self.removed.iter() {
            let Some(key) = FounderKey::from_line(before) else {
                continue;
            };
            let after = self
                .added
                .iter()
                .find(|line| FounderKey::from_line(line).as_ref() == Some(&key));
            if let Some(after) = after {
                changes.push(FounderChange {
                    key,
                    before: before.clone(),
                    after: after.clone(),
                });
            }
        }
        changes
    }
}

/// Plain set difference in both directions
pub fn diff_founders(old: &FounderSet, new: &FounderSet) -> FounderDiff {
    FounderDiff {
        added: new.difference(old),
        removed: old.difference(new),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(lines: &[&str]) -> FounderSet {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn record(name: &[&str], tax_id: &str, date: Option<&str>) -> FounderRecord {
        let mut r = FounderRecord::new(name.iter().map(|s| s.to_string()).collect(), tax_id.to_string());
        r.latest_registration_date = date.map(str::to_string);
        r
    }

    #[test]
    fn test_canonical_line_title_cases_name() {
        let r = record(&["ИВАНОВ", "ИВАН", "ИВАНОВИЧ"], "1234567890", Some("15.03.2021"));
        assert_eq!(canonical_line(&r), "Иванов Иван Иванович - 1234567890 - 15.03.2021");
    }

    #[test]
    fn test_canonical_line_without_date() {
        let r = record(&["Сидоров", "Сидор"], "1234567890", None);
        assert_eq!(canonical_line(&r), "Сидоров Сидор - 1234567890");
        // survives a write/read cycle
        let stored = FounderSet::from_records(&[r]);
        assert_eq!(FounderSet::parse(&stored.serialize()), stored);
    }

    #[test]
    fn test_title_case_hyphenated() {
        assert_eq!(title_case("РИМСКИЙ-КОРСАКОВ николай"), "Римский-Корсаков Николай");
    }

    #[test]
    fn test_parse_trims_and_drops_blanks() {
        let parsed = FounderSet::parse("  B - 222 - 02.02.2020 \n\n A - 111 - 01.01.2020\n   \n");
        assert_eq!(parsed, set(&["A - 111 - 01.01.2020", "B - 222 - 02.02.2020"]));
    }

    #[test]
    fn test_serialize_sorted_and_idempotent() {
        let s = set(&["B - 222 - 02.02.2020", "A - 111 - 01.01.2020"]);
        let text = s.serialize();
        assert_eq!(text, "A - 111 - 01.01.2020\nB - 222 - 02.02.2020");
        assert_eq!(FounderSet::parse(&text).serialize(), text);
    }

    #[test]
    fn test_diff_reflexive() {
        let s = set(&["A - 111 - 01.01.2020", "B - 222 - 02.02.2020"]);
        let diff = diff_founders(&s, &s);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_diff_antisymmetric_and_disjoint() {
        let a = set(&["A - 111 - 01.01.2020", "C - 333 - 03.03.2020"]);
        let b = set(&["B - 222 - 02.02.2020", "C - 333 - 03.03.2020"]);

        let ab = diff_founders(&a, &b);
        let ba = diff_founders(&b, &a);
        assert_eq!(ab.added, ba.removed);
        assert_eq!(ab.removed, ba.added);
        assert!(ab.added.intersection(&ab.removed).is_empty());
    }

    #[test]
    fn test_diff_replaced_founder() {
        let old = set(&["A - 111 - 01.01.2020"]);
        let new = set(&["B - 222 - 02.02.2020"]);
        let diff = diff_founders(&old, &new);
        assert_eq!(diff.added, set(&["B - 222 - 02.02.2020"]));
        assert_eq!(diff.removed, set(&["A - 111 - 01.01.2020"]));
        assert!(diff.changed().is_empty());
    }

    #[test]
    fn test_date_change_is_add_remove_pair_and_a_change() {
        let old = set(&["Иванов Иван - 1234567890 - 15.03.2021"]);
        let new = set(&["Иванов Иван - 1234567890 - 01.01.2022"]);
        let diff = diff_founders(&old, &new);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 1);
        let changes = diff.changed();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key.tax_id, "1234567890");
        assert_eq!(changes[0].before, "Иванов Иван - 1234567890 - 15.03.2021");
        assert_eq!(changes[0].after, "Иванов Иван - 1234567890 - 01.01.2022");
    }

    #[test]
    fn test_without_keys() {
        let s = set(&["A - 111 - 01.01.2020", "B - 222 - 02.02.2020"]);
        let keys = set(&["A - 111 - 05.05.2021"]).keys();
        assert_eq!(s.without_keys(&keys), set(&["B - 222 - 02.02.2020"]));
    }
}
