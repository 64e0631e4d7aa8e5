//! Domain logic - pure release rules independent of any remote system

pub mod branch;
pub mod notes;
pub mod rota;
pub mod tag;
pub mod version;
pub mod version_file;

pub use branch::release_branch_name;
pub use notes::{build_notes, NoteIssue, NotesFormat};
pub use rota::rotate_release_captain;
pub use tag::{last_rc_number, rc_tag_name};
pub use version::{is_valid_upgrade, ReleaseScope, Version};
pub use version_file::VersionFile;
