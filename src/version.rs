//! Version bumping for `recipe.piml`.

use std::fmt;
use std::str::FromStr;

use crate::error::VersionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bump {
    Major,
    Minor,
    Patch,
}

impl FromStr for Bump {
    type Err = VersionError;

    fn from_str(part: &str) -> Result<Self, Self::Err> {
        match part.to_ascii_lowercase().as_str() {
            "major" => Ok(Bump::Major),
            "minor" => Ok(Bump::Minor),
            "patch" => Ok(Bump::Patch),
            _ => Err(VersionError::Part(part.to_string())),
        }
    }
}

impl fmt::Display for Bump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Bump::Major => "major",
            Bump::Minor => "minor",
            Bump::Patch => "patch",
        })
    }
}

/// Bumps `version` and returns the new `X.Y.Z` string.
///
/// A two-part `X.Y` version is treated as `X.Y.0`. Anything after the
/// numeric core (`-rc.1`, `+build`) is dropped.
pub fn bump(version: &str, part: Bump) -> Result<String, VersionError> {
    let (mut major, mut minor, mut patch) = parse(version)?;

    match part {
        Bump::Major => {
            major += 1;
            minor = 0;
            patch = 0;
        }
        Bump::Minor => {
            minor += 1;
            patch = 0;
        }
        Bump::Patch => patch += 1,
    }

    Ok(format!("{major}.{minor}.{patch}"))
}

fn parse(version: &str) -> Result<(u64, u64, u64), VersionError> {
    let invalid = || VersionError::Format(version.to_string());

    let core = version
        .trim()
        .split(['-', '+'])
        .next()
        .unwrap_or_default();

    let numbers = core
        .split('.')
        .map(|n| n.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    match numbers[..] {
        [major, minor, patch] => Ok((major, minor, patch)),
        [major, minor] => Ok((major, minor, 0)),
        _ => Err(invalid()),
    }
}
