//! Natural ordering for directory listings ("file2" < "file10")

use crate::Entry;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSortPart {
    Num(u64),
    Str(String),
}

/// Generate a natural sort key (handles numbers correctly)
/// "image2.jpg" < "image10.jpg"
fn natural_sort_key(s: &str) -> Vec<NaturalSortPart> {
    let mut parts = Vec::new();
    let mut current_num = String::new();
    let mut current_str = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !current_str.is_empty() {
                parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
                current_str.clear();
            }
            current_num.push(c);
        } else {
            if !current_num.is_empty() {
                parts.push(number_part(&current_num));
                current_num.clear();
            }
            current_str.push(c);
        }
    }

    if !current_num.is_empty() {
        parts.push(number_part(&current_num));
    }
    if !current_str.is_empty() {
        parts.push(NaturalSortPart::Str(current_str.to_lowercase()));
    }

    parts
}

// Runs too long for u64 fall back to text comparison
fn number_part(digits: &str) -> NaturalSortPart {
    digits
        .parse::<u64>()
        .map(NaturalSortPart::Num)
        .unwrap_or_else(|_| NaturalSortPart::Str(digits.to_string()))
}

/// Case-insensitive natural comparison; ties are broken by the raw names so the
/// order is total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_sort_key(a)
        .cmp(&natural_sort_key(b))
        .then_with(|| a.cmp(b))
}

pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(|a, b| natural_cmp(&a.name, &b.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_sort() {
        let mut names = vec!["image10.jpg", "image2.jpg", "image1.jpg", "image20.jpg"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["image1.jpg", "image2.jpg", "image10.jpg", "image20.jpg"]);
    }

    #[test]
    fn test_case_insensitive_with_stable_ties() {
        let mut names = vec!["b", "B", "a10", "A2"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["A2", "a10", "B", "b"]);
    }

    #[test]
    fn test_archive_sorts_before_its_mount_point() {
        let mut names = vec!["data.zip-dir", "file10", "data.zip", "file2"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["data.zip", "data.zip-dir", "file2", "file10"]);
    }
}
