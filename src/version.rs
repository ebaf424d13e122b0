//! Package version ordering.
//!
//! Implements the comparison used across the package ecosystem:
//! `[epoch:]pkgver[-pkgrel]`, where epoch raises precedence, pkgver is
//! compared segment-wise (digit runs numerically, letter runs
//! lexically) and pkgrel breaks ties when both versions carry one.

use std::cmp::Ordering;

/// Compare two full version strings.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (epoch1, ver1, rel1) = parse_evr(a);
    let (epoch2, ver2, rel2) = parse_evr(b);

    let mut ret = rpmvercmp(epoch1, epoch2);
    if ret == Ordering::Equal {
        ret = rpmvercmp(ver1, ver2);
        if ret == Ordering::Equal {
            if let (Some(rel1), Some(rel2)) = (rel1, rel2) {
                ret = rpmvercmp(rel1, rel2);
            }
        }
    }

    ret
}

/// Split `[epoch:]version[-release]`. A missing epoch counts as "0";
/// the release is everything after the last dash, if any.
fn parse_evr(evr: &str) -> (&str, &str, Option<&str>) {
    let bytes = evr.as_bytes();
    let digits = bytes.iter().take_while(|c| c.is_ascii_digit()).count();
    let (epoch, rest) = if bytes.get(digits) == Some(&b':') {
        let epoch = &evr[..digits];
        (if epoch.is_empty() { "0" } else { epoch }, &evr[digits + 1..])
    } else {
        ("0", evr)
    };

    match rest.rfind('-') {
        Some(dash) => (epoch, &rest[..dash], Some(&rest[dash + 1..])),
        None => (epoch, rest, None),
    }
}

/// Segment-wise comparison of two version fragments.
fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    while i < one.len() && j < two.len() {
        let sep1 = i;
        let sep2 = j;
        while i < one.len() && !one[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < two.len() && !two[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        // unequal runs of separators decide the comparison outright
        if i - sep1 != j - sep2 {
            return if i - sep1 < j - sep2 {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        // grab a completely numeric or completely alphabetic segment
        let isnum = one[i].is_ascii_digit();
        let mut end1 = i;
        let mut end2 = j;
        if isnum {
            while end1 < one.len() && one[end1].is_ascii_digit() {
                end1 += 1;
            }
            while end2 < two.len() && two[end2].is_ascii_digit() {
                end2 += 1;
            }
        } else {
            while end1 < one.len() && one[end1].is_ascii_alphabetic() {
                end1 += 1;
            }
            while end2 < two.len() && two[end2].is_ascii_alphabetic() {
                end2 += 1;
            }
        }

        let seg1 = &a[i..end1];
        let seg2 = &b[j..end2];

        // a numeric segment is always newer than an alphabetic one
        if seg2.is_empty() {
            return if isnum {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        if isnum {
            let seg1 = seg1.trim_start_matches('0');
            let seg2 = seg2.trim_start_matches('0');
            // more digits wins; same digits compare lexically
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            ord => return ord,
        }

        i = end1;
        j = end2;
    }

    let rest1 = &one[i..];
    let rest2 = &two[j..];

    if rest1.is_empty() && rest2.is_empty() {
        return Ordering::Equal;
    }

    // a leftover alphabetic tail never beats an empty string
    let alpha1 = rest1.first().is_some_and(|c| c.is_ascii_alphabetic());
    let alpha2 = rest2.first().is_some_and(|c| c.is_ascii_alphabetic());
    if (rest1.is_empty() && !alpha2) || alpha1 {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

#[cfg(test)]
fn run(a: &str, b: &str, expected: i32) {
    let to_int = |ord: Ordering| match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    assert_eq!(to_int(vercmp(a, b)), expected, "vercmp({:?}, {:?})", a, b);
    assert_eq!(to_int(vercmp(b, a)), -expected, "vercmp({:?}, {:?})", b, a);
}

#[test]
fn test_simple() {
    run("1.5.0", "1.5.0", 0);
    run("1.5.1", "1.5.0", 1);
    run("1.5.1", "1.5", 1);
    run("23", "23", 0);
    run("1..0", "1.0", 1);
    run("2.0", "2_0", 0);
}

#[test]
fn test_pkgrel() {
    run("1.5.0-1", "1.5.0-1", 0);
    run("1.5.0-1", "1.5.0-2", -1);
    run("1.5.0-1", "1.5.1-1", -1);
    run("1.5.0-2", "1.5.1-1", -1);
    run("1.5-1", "1.5", 0);
    run("1.5-1", "1.5.1-1", -1);
    run("1.5-2", "1.5.1-1", -1);
    run("1.5-2", "1.5.1-2", -1);
}

#[test]
fn test_alphanumeric() {
    run("1.5b-1", "1.5-1", -1);
    run("1.5b", "1.5", -1);
    run("1.5b-1", "1.5", -1);
    run("1.5b", "1.5.1", -1);
    run("1.0a", "1.0alpha", -1);
    run("1.0alpha", "1.0b", -1);
    run("1.0b", "1.0beta", -1);
    run("1.0beta", "1.0rc", -1);
    run("1.0rc", "1.0", -1);
}

#[test]
fn test_dotted_alpha() {
    run("1.5.a", "1.5", 1);
    run("1.5.b", "1.5.a", 1);
    run("1.5.1", "1.5.b", 1);
    run("1.5.b-1", "1.5.b", 0);
    run("1.5-1", "1.5.b", -1);
}

#[test]
fn test_epoch() {
    run("0:1.0", "0:1.0", 0);
    run("0:1.0", "0:1.1", -1);
    run("1:1.0", "0:1.0", 1);
    run("1:1.0", "0:1.1", 1);
    run("1:1.0", "2:1.1", -1);
    run("1:1.0", "0:1.0-1", 1);
    run("1:1.0-1", "0:1.1-1", 1);
    run("0:1.0", "1.0", 0);
    run(":1.0", "1.0", 0);
}

#[test]
fn test_transitivity_spot_checks() {
    // 1.0a < 1.0alpha < 1.0b implies 1.0a < 1.0b
    run("1.0a", "1.0b", -1);
    // 1.5 < 1.5.a < 1.5.b implies 1.5 < 1.5.b
    run("1.5", "1.5.b", -1);
}
