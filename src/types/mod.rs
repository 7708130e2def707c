//! Core data types for the package data model.

pub mod choices;
pub mod contents;
pub mod mask;
pub mod name;
pub mod package;
pub mod spec;
pub mod version;

pub use choices::{ChangedChoices, Choice, ChoiceForce, ChoiceOrigin, ChoiceValue, Choices};
pub use contents::{Contents, ContentsEntry};
pub use mask::{Mask, MaskOverrideReason, OverriddenMask};
pub use name::{
    CategoryNamePart, ChoiceNameWithPrefix, ChoicePrefixName, KeywordName, PackageNamePart,
    QualifiedPackageName, RepositoryName, SetName, SlotName, UnprefixedChoiceName,
};
pub use package::{ActionKind, MetadataValue, PackageId, PackageIdBuilder};
pub use spec::{
    BlockDepSpec, ChoiceRequirement, KeyRequirement, NameConstraint, PackageDepSpec,
    PackageDepSpecBuilder, SlotRequirement, VersionRequirement, VersionRequirementsMode,
};
pub use version::{SuffixKind, VersionOperator, VersionSpec, VersionSuffix};
