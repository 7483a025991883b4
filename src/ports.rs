use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

/// Validated, deduplicated, strictly ascending set of TCP ports (1..=65535).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet(Vec<u16>);

impl PortSet {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.binary_search(&port).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    /// Canonical spec form: consecutive runs collapse into `a-b`.
    ///
    /// Feeding this back into [`parse_port_spec`] yields the same set.
    pub fn to_spec_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut iter = self.0.iter().copied().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while let Some(&next) = iter.peek() {
                if next as u32 == end as u32 + 1 {
                    end = next;
                    iter.next();
                } else {
                    break;
                }
            }
            if start == end {
                parts.push(start.to_string());
            } else {
                parts.push(format!("{start}-{end}"));
            }
        }
        parts.join(",")
    }
}

impl FromIterator<u16> for PortSet {
    fn from_iter<I: IntoIterator<Item = u16>>(iter: I) -> Self {
        let set: BTreeSet<u16> = iter.into_iter().filter(|&p| p != 0).collect();
        PortSet(set.into_iter().collect())
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec_string())
    }
}

/// Outcome of parsing a port specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPorts {
    pub ports: PortSet,
    /// Tokens that were malformed or out of range and therefore skipped.
    pub dropped: usize,
}

/// Parse a comma-separated port spec such as `22,80,8000-8100`.
///
/// - a reversed range (`25-20`) is normalized to `20-25`
/// - tokens that are not integers, or whose bounds fall outside 1..=65535,
///   are dropped and counted in [`ParsedPorts::dropped`]
/// - empty tokens (`80,,443`) are ignored without counting
///
/// Never fails: a fully invalid spec yields an empty set.
pub fn parse_port_spec(spec: &str) -> ParsedPorts {
    collect_tokens(spec.split(','))
}

/// Parse a ports file: one spec per line, `#` starts a comment.
///
/// Each line may itself hold a comma-separated spec.
pub fn parse_ports_file(s: &str) -> ParsedPorts {
    collect_tokens(
        s.lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(',')),
    )
}

/// Load and parse a ports file from disk.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<ParsedPorts> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    Ok(parse_ports_file(&content))
}

/// Quick preset of commonly exposed services.
pub fn top_ports() -> PortSet {
    const TOP: &[u16] = &[22, 80, 443, 21, 23, 25, 53, 110, 143, 445, 3389, 3306, 8080];
    TOP.iter().copied().collect()
}

/// Every well-known port, 1 through 1024.
pub fn well_known_ports() -> PortSet {
    (1..=1024).collect()
}

fn collect_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> ParsedPorts {
    let mut seen = BTreeSet::new();
    let mut dropped = 0usize;

    for raw in tokens {
        let token = raw.trim();
        if token.is_empty() {
            continue;
        }
        match parse_token(token) {
            Some(range) => seen.extend(range),
            None => dropped += 1,
        }
    }

    ParsedPorts {
        ports: PortSet(seen.into_iter().collect()),
        dropped,
    }
}

fn parse_token(token: &str) -> Option<RangeInclusive<u16>> {
    if let Some((a, b)) = token.split_once('-') {
        let mut start = parse_port_str(a.trim())?;
        let mut end = parse_port_str(b.trim())?;
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        return Some(start..=end);
    }
    let p = parse_port_str(token)?;
    Some(p..=p)
}

fn parse_port_str(s: &str) -> Option<u16> {
    let val: u32 = s.parse().ok()?;
    if val == 0 || val > 65535 {
        return None;
    }
    Some(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports() {
        let parsed = parse_port_spec("80, 22 ,443");
        assert_eq!(parsed.ports.as_slice(), &[22, 80, 443]);
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn reversed_range_is_swapped() {
        let parsed = parse_port_spec("25-20");
        assert_eq!(parsed.ports.as_slice(), &[20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn range_with_out_of_bounds_end_is_dropped() {
        let parsed = parse_port_spec("65530-70000,0-5,22");
        assert_eq!(parsed.ports.as_slice(), &[22]);
        assert_eq!(parsed.dropped, 2);
    }

    #[test]
    fn empty_tokens_are_not_counted() {
        let parsed = parse_port_spec("80,,443,");
        assert_eq!(parsed.ports.as_slice(), &[80, 443]);
        assert_eq!(parsed.dropped, 0);
    }

    #[test]
    fn negative_and_garbage_dropped() {
        let parsed = parse_port_spec("-5,1-2-3,x-9");
        assert!(parsed.ports.is_empty());
        assert_eq!(parsed.dropped, 3);
    }

    #[test]
    fn spec_string_collapses_runs() {
        let set: PortSet = [1, 2, 3, 5, 7, 8].into_iter().collect();
        assert_eq!(set.to_spec_string(), "1-3,5,7-8");
        assert_eq!(set.to_string(), "1-3,5,7-8");
    }

    #[test]
    fn spec_string_handles_upper_bound() {
        let set: PortSet = [65534, 65535].into_iter().collect();
        assert_eq!(set.to_spec_string(), "65534-65535");
    }

    #[test]
    fn from_iter_filters_zero_and_dedups() {
        let set: PortSet = [0, 443, 80, 443].into_iter().collect();
        assert_eq!(set.as_slice(), &[80, 443]);
        assert!(set.contains(443));
        assert!(!set.contains(0));
    }

    #[test]
    fn parse_file_with_comments_and_whitespace() {
        let input = r#"
            # common web ports
            80  # http
            443 # https
            8002-8000   # dev servers, reversed
            22,23
            bogus
        "#;
        let parsed = parse_ports_file(input);
        assert_eq!(parsed.ports.as_slice(), &[22, 23, 80, 443, 8000, 8001, 8002]);
        assert_eq!(parsed.dropped, 1);
    }

    #[test]
    fn presets_are_sane() {
        let top = top_ports();
        assert_eq!(top.len(), 13);
        assert!(top.contains(22) && top.contains(8080));
        let wk = well_known_ports();
        assert_eq!(wk.len(), 1024);
        assert_eq!(wk.to_spec_string(), "1-1024");
    }
}
