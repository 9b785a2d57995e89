//! Version parsing and Composer constraint building.
//!
//! WordPress plugins and themes report free-form versions ("4.2", "1.0.3.1",
//! "2.0-beta3", "trunk"). This module normalizes them the way Composer does,
//! orders them, and turns a concrete version into a `require` constraint.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

/// Development-branch sentinel reported for unreleased checkouts.
pub const TRUNK: &str = "trunk";

/// Constraint used for modules tracking the development branch.
pub const TRUNK_CONSTRAINT: &str = "dev-trunk";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^v?
        (?P<numbers>\d+(?:\.\d+){0,3})
        (?:
            [._-]?
            (?P<modifier>stable|beta|b|rc|alpha|a|patch|pl|p)
            (?:[._-]?(?P<number>\d+))?
        )?
        (?P<dev>[._-]?dev)?
        $",
    )
    .expect("version pattern is valid")
});

/// Release stability, ordered from least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    Dev,
    Alpha,
    Beta,
    RC,
    Stable,
}

impl Stability {
    /// Flag appended to a constraint (`^1.2@beta`).
    pub fn flag(&self) -> &'static str {
        match self {
            Stability::Dev => "dev",
            Stability::Alpha => "alpha",
            Stability::Beta => "beta",
            Stability::RC => "RC",
            Stability::Stable => "stable",
        }
    }

    fn from_modifier(modifier: &str) -> Self {
        match modifier.to_ascii_lowercase().as_str() {
            "alpha" | "a" => Stability::Alpha,
            "beta" | "b" => Stability::Beta,
            "rc" => Stability::RC,
            _ => Stability::Stable,
        }
    }
}

/// A parsed numeric version with its stability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    segments: Vec<u64>,
    stability: Stability,
    /// Composer's `patch`/`pl` releases sort above the plain release
    patch_level: bool,
    pre_number: u64,
}

impl Version {
    /// Parse a version string. Returns `None` for branch names and anything
    /// that is not a dotted numeric version with an optional stability suffix.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let without_build = trimmed.split('+').next().unwrap_or(trimmed);
        let captures = VERSION_RE.captures(without_build)?;

        let segments = captures["numbers"]
            .split('.')
            .map(|s| s.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        let modifier = captures.name("modifier").map(|m| m.as_str());
        let patch_level = modifier
            .map(|m| matches!(m.to_ascii_lowercase().as_str(), "patch" | "pl" | "p"))
            .unwrap_or(false);
        let mut stability = modifier.map(Stability::from_modifier).unwrap_or(Stability::Stable);
        if captures.name("dev").is_some() {
            stability = Stability::Dev;
        }
        let pre_number = captures
            .name("number")
            .and_then(|n| n.as_str().parse().ok())
            .unwrap_or(0);

        Some(Self {
            segments,
            stability,
            patch_level,
            pre_number,
        })
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Stable
    }

    /// True for `0`, `0.0`, `0.0.0.0` and friends, which registries use as placeholders.
    pub fn is_zero(&self) -> bool {
        self.segments.iter().all(|s| *s == 0)
    }

    /// The numeric segments as written.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// Segments padded with zeros to Composer's four-part form.
    fn padded(&self) -> [u64; 4] {
        let mut padded = [0; 4];
        for (slot, value) in padded.iter_mut().zip(&self.segments) {
            *slot = *value;
        }
        padded
    }

    /// Composer's normalized form, e.g. `4.2.0.0` or `2.0.0.0-beta3`.
    pub fn normalized(&self) -> String {
        let base = self
            .padded()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(".");
        match (self.stability, self.patch_level) {
            (Stability::Stable, true) => format!("{}-patch{}", base, self.pre_number),
            (Stability::Stable, false) => base,
            (Stability::Dev, _) => format!("{}-dev", base),
            (stability, _) => format!("{}-{}{}", base, stability.flag(), self.pre_number),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.padded()
            .cmp(&other.padded())
            .then(self.stability.cmp(&other.stability))
            .then(self.patch_level.cmp(&other.patch_level))
            .then(self.pre_number.cmp(&other.pre_number))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// True for the development-branch sentinel in any of its spellings.
pub fn is_trunk(version: &str) -> bool {
    let lowered = version.trim().to_ascii_lowercase();
    lowered == TRUNK || lowered == TRUNK_CONSTRAINT
}

/// Build a caret constraint that accepts `version` and its compatible successors.
///
/// - `4.2.0` becomes `^4.2`, `1.4.5` becomes `^1.4`, `1.0.0.0` becomes `^1.0`
/// - `4.2.3-beta1` becomes `^4.2.3@beta`
/// - `trunk` becomes `dev-trunk`
///
/// Returns `None` when the version cannot be parsed; such a module cannot be
/// converted into a managed dependency automatically.
pub fn build_constraint(version: &str) -> Option<String> {
    if is_trunk(version) {
        return Some(TRUNK_CONSTRAINT.to_string());
    }

    let parsed = Version::parse(version)?;
    let mut segments = parsed.segments().to_vec();
    while segments.len() > 2 && segments.last() == Some(&0) {
        segments.pop();
    }
    if parsed.is_stable() && segments.len() > 2 {
        segments.pop();
    }

    let base = segments
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".");

    if parsed.is_stable() {
        Some(format!("^{}", base))
    } else {
        Some(format!("^{}@{}", base, parsed.stability().flag()))
    }
}
