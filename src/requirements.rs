//! Requirement parsing and resolution.
//!
//! Requirements are `name=version` pins. Entries may also name a nested
//! requirements file (any entry ending in [`REQUIREMENTS_SUFFIX`]), which is
//! read and expanded in place. Resolution yields a flat list in first-seen
//! order and refuses to return if any package name appears twice anywhere in
//! the expansion.

use crate::error::{MaiarError, Result};
use crate::identity::{PackageIdentity, PackageName};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::collections::HashMap;

/// Suffix identifying an entry as a nested requirements file.
pub const REQUIREMENTS_SUFFIX: &str = ".txt";

/// Parse a single `name=version` requirement.
///
/// The line is split on its first `=`. The version is trimmed and loses any
/// leading or trailing `=` characters, so `foo==1.2` and `foo=1.2=` both
/// parse as `foo` at `1.2`.
///
/// # Errors
///
/// Returns [`MaiarError::Parse`] if the line has no `=`, the name is empty,
/// or either half fails identity validation.
///
/// # Examples
///
/// ```
/// use maiar::requirements::parse_requirement;
///
/// let identity = parse_requirement("foo=1.2.3=").expect("valid requirement");
/// assert_eq!(identity.name().as_str(), "foo");
/// assert_eq!(identity.version().as_str(), "1.2.3");
/// assert!(parse_requirement("foo").is_err());
/// ```
pub fn parse_requirement(line: &str) -> Result<PackageIdentity> {
    let (name, version) = line
        .split_once('=')
        .ok_or_else(|| MaiarError::parse(line, "expected <name>=<version>"))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(MaiarError::parse(line, "package name is empty"));
    }

    let version = version.trim().trim_matches('=').trim();
    if version.is_empty() {
        return Err(MaiarError::parse(line, "version is empty"));
    }

    PackageIdentity::from_parts(name, version)
}

/// Resolve requirement entries into a flat, duplicate-free list.
///
/// Blank entries and entries starting with `#` are skipped. Nested file
/// paths are resolved relative to `base_dir`.
///
/// # Errors
///
/// Returns [`MaiarError::Parse`] for malformed pins,
/// [`MaiarError::MissingFile`] for absent nested files,
/// [`MaiarError::IncludeCycle`] when a file includes itself, and
/// [`MaiarError::DuplicatePackage`] when a name repeats.
pub fn resolve<S: AsRef<str>>(entries: &[S], base_dir: &Utf8Path) -> Result<Vec<PackageIdentity>> {
    let mut resolver = Resolver::default();
    for (index, entry) in entries.iter().enumerate() {
        let origin = format!("argument {}", index + 1);
        resolver.entry(entry.as_ref(), base_dir, &origin)?;
    }
    Ok(resolver.resolved)
}

/// Resolve every entry of a requirements file.
///
/// # Errors
///
/// See [`resolve`].
pub fn resolve_file(path: &Utf8Path) -> Result<Vec<PackageIdentity>> {
    let mut resolver = Resolver::default();
    resolver.file(path)?;
    Ok(resolver.resolved)
}

#[derive(Default)]
struct Resolver {
    resolved: Vec<PackageIdentity>,
    origins: HashMap<PackageName, String>,
    expanding: Vec<Utf8PathBuf>,
}

impl Resolver {
    fn entry(&mut self, raw: &str, base_dir: &Utf8Path, origin: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        if line.ends_with(REQUIREMENTS_SUFFIX) {
            return self.file(&base_dir.join(line));
        }

        let identity = parse_requirement(line)?;
        self.push(identity, origin)
    }

    fn file(&mut self, path: &Utf8Path) -> Result<()> {
        if !path.is_file() {
            return Err(MaiarError::MissingFile {
                path: path.to_owned(),
            });
        }

        let canonical = path.canonicalize_utf8()?;
        if self.expanding.contains(&canonical) {
            return Err(MaiarError::IncludeCycle {
                path: path.to_owned(),
            });
        }

        debug!("reading requirements from {path}");
        let contents = std::fs::read_to_string(&canonical)?;
        let base_dir = canonical
            .parent()
            .map_or_else(|| Utf8PathBuf::from("."), Utf8Path::to_path_buf);

        self.expanding.push(canonical);
        for (index, line) in contents.lines().enumerate() {
            let origin = format!("{path}:{}", index + 1);
            self.entry(line, &base_dir, &origin)?;
        }
        self.expanding.pop();
        Ok(())
    }

    fn push(&mut self, identity: PackageIdentity, origin: &str) -> Result<()> {
        if let Some(first) = self.origins.get(identity.name()) {
            return Err(MaiarError::DuplicatePackage {
                name: identity.name().clone(),
                first: first.clone(),
                second: origin.to_owned(),
            });
        }
        self.origins
            .insert(identity.name().clone(), origin.to_owned());
        self.resolved.push(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8_dir(temp: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("temp dir is UTF-8")
    }

    fn names(resolved: &[PackageIdentity]) -> Vec<String> {
        resolved.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case::plain("foo=1.2.3", "foo", "1.2.3")]
    #[case::trailing_equals("foo=1.2.3=", "foo", "1.2.3")]
    #[case::double_equals("foo==1.2.3", "foo", "1.2.3")]
    #[case::whitespace("  foo = 1.2  ", "foo", "1.2")]
    fn parse_requirement_accepts(#[case] line: &str, #[case] name: &str, #[case] version: &str) {
        let identity = parse_requirement(line).expect("valid requirement");
        assert_eq!(identity.name().as_str(), name);
        assert_eq!(identity.version().as_str(), version);
    }

    #[rstest]
    #[case::no_equals("foo")]
    #[case::empty_name("=1.2")]
    #[case::empty_version("foo=")]
    #[case::bad_version("foo=latest")]
    fn parse_requirement_rejects(#[case] line: &str) {
        let result = parse_requirement(line);
        assert!(
            matches!(result, Err(MaiarError::Parse { .. })),
            "expected Parse error for {line:?}, got {result:?}"
        );
    }

    #[test]
    fn resolve_skips_blank_and_comment_lines() {
        let resolved = resolve(&["", "# pinned", "foo=1.0", "   "], Utf8Path::new("."))
            .expect("resolution succeeds");
        assert_eq!(names(&resolved), vec!["foo.1.0"]);
    }

    #[test]
    fn resolve_preserves_order_across_nested_files() {
        let temp = TempDir::new().expect("temp dir");
        let dir = utf8_dir(&temp);
        std::fs::create_dir(dir.join("sub")).expect("create sub");
        std::fs::write(dir.join("base.txt"), "b=1.0\nsub/inner.txt\nd=4.0\n").expect("write");
        std::fs::write(dir.join("sub/inner.txt"), "# inner\nc=3.0\n").expect("write");

        let resolved =
            resolve(&["a=0.1", "base.txt", "e=5.0"], &dir).expect("resolution succeeds");
        assert_eq!(
            names(&resolved),
            vec!["a.0.1", "b.1.0", "c.3.0", "d.4.0", "e.5.0"]
        );
    }

    #[test]
    fn resolve_rejects_sibling_duplicates() {
        let result = resolve(&["foo=1.0", "foo=1.0"], Utf8Path::new("."));
        assert!(matches!(result, Err(MaiarError::DuplicatePackage { .. })));
    }

    #[test]
    fn resolve_rejects_duplicates_across_nested_files() {
        let temp = TempDir::new().expect("temp dir");
        let dir = utf8_dir(&temp);
        std::fs::write(dir.join("one.txt"), "foo=1.0\n").expect("write");
        std::fs::write(dir.join("two.txt"), "bar=1.0\nfoo=2.0\n").expect("write");

        let err = resolve(&["one.txt", "two.txt"], &dir).expect_err("duplicate must fail");
        let MaiarError::DuplicatePackage { name, second, .. } = err else {
            panic!("expected DuplicatePackage, got {err:?}");
        };
        assert_eq!(name.as_str(), "foo");
        assert!(second.ends_with("two.txt:2"));
    }

    #[test]
    fn resolve_reports_missing_nested_file() {
        let temp = TempDir::new().expect("temp dir");
        let dir = utf8_dir(&temp);
        let result = resolve(&["absent.txt"], &dir);
        assert!(matches!(result, Err(MaiarError::MissingFile { .. })));
    }

    #[test]
    fn resolve_detects_include_cycles() {
        let temp = TempDir::new().expect("temp dir");
        let dir = utf8_dir(&temp);
        std::fs::write(dir.join("a.txt"), "b.txt\n").expect("write");
        std::fs::write(dir.join("b.txt"), "a.txt\n").expect("write");

        let result = resolve_file(&dir.join("a.txt"));
        assert!(matches!(result, Err(MaiarError::IncludeCycle { .. })));
    }

    #[test]
    fn resolve_propagates_parse_errors_from_files() {
        let temp = TempDir::new().expect("temp dir");
        let dir = utf8_dir(&temp);
        std::fs::write(dir.join("bad.txt"), "foo\n").expect("write");

        let result = resolve_file(&dir.join("bad.txt"));
        assert!(matches!(result, Err(MaiarError::Parse { .. })));
    }
}
