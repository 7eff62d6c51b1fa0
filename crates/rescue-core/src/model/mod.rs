pub mod case;
pub mod submission;

pub use case::{
    Case, CaseDelta, CaseId, Category, ContributorId, DescriptionEntry, LocationEntry,
    ParseEnumError, PhotoEntry, Point, ReporterEntry, Status, normalize_category,
};
pub use submission::{PhotoSource, ReporterFields, Submission};
