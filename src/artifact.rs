//! Test case identity and the on-disk artifact namespace.
//!
//! Every artifact of a test case is derived from its [`TestId`] through
//! [`ArtifactKind::file_name`]. Nothing else in the crate formats artifact
//! names, so padding can only be decided in one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Numeric test case identifier.
///
/// Displays zero-padded to two digits (`7` is `07`, `123` stays `123`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TestId(u32);

impl TestId {
    /// Creates an identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Contiguous inclusive ID range `[0, max_id]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    max_id: u32,
}

impl IdRange {
    /// Creates the range `[0, max_id]`.
    #[must_use]
    pub const fn up_to(max_id: u32) -> Self {
        Self { max_id }
    }

    /// Highest ID in the range.
    #[must_use]
    pub const fn max_id(self) -> TestId {
        TestId(self.max_id)
    }

    /// Number of test cases in the range (`max_id + 1`).
    #[must_use]
    pub fn total(self) -> u64 {
        u64::from(self.max_id) + 1
    }

    /// Iterates the IDs in ascending order.
    pub fn iter(self) -> impl Iterator<Item = TestId> {
        (0..=self.max_id).map(TestId)
    }
}

/// Kinds of per-case artifact living in the testcase directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// `test<NN>.c`
    Source,
    /// `std<NN>.txt`
    ExpectedOutput,
    /// `ans<NN>.txt`
    ActualOutput,
    /// `test<NN>.out`
    ReferenceBinary,
    /// `test<NN>.bc`
    Bitcode,
}

impl ArtifactKind {
    const fn parts(self) -> (&'static str, &'static str) {
        match self {
            Self::Source => ("test", "c"),
            Self::ExpectedOutput => ("std", "txt"),
            Self::ActualOutput => ("ans", "txt"),
            Self::ReferenceBinary => ("test", "out"),
            Self::Bitcode => ("test", "bc"),
        }
    }

    /// File name of this artifact for `id`.
    #[must_use]
    pub fn file_name(self, id: TestId) -> String {
        let (stem, ext) = self.parts();
        format!("{stem}{id}.{ext}")
    }
}

/// One numbered unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Identifier all artifact names derive from.
    pub id: TestId,
    /// Path of the test source.
    pub source_path: PathBuf,
    /// Support library linked into the reference build, if any.
    pub support_library: Option<PathBuf>,
}

/// Maps test IDs to artifact paths inside one testcase directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    dir: PathBuf,
    support_library: Option<PathBuf>,
}

impl ArtifactLayout {
    /// Layout rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            support_library: None,
        }
    }

    /// Attaches the support library every [`TestCase`] links against.
    #[must_use]
    pub fn with_support_library(mut self, library: impl Into<PathBuf>) -> Self {
        self.support_library = Some(library.into());
        self
    }

    /// Testcase directory; also the working directory of every process.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `kind` for `id`.
    #[must_use]
    pub fn path(&self, kind: ArtifactKind, id: TestId) -> PathBuf {
        self.dir.join(kind.file_name(id))
    }

    /// Describes test case `id`.
    #[must_use]
    pub fn test_case(&self, id: TestId) -> TestCase {
        TestCase {
            id,
            source_path: self.path(ArtifactKind::Source, id),
            support_library: self.support_library.clone(),
        }
    }
}
