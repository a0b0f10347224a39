//! CWL helpers
//!
//! Pure functions over CWL documents and bindings: workflow inspection and
//! translation, file extraction from bindings, and interpretation of the
//! runner's log. Documents may be YAML or JSON; they are always written back
//! as JSON, which every supported runner accepts.

mod binding;
mod error;
mod result;
mod workflow;

pub use binding::{get_files_from_binding, get_secondary_files, json_pointers};
pub use error::CwlError;
pub use result::get_cwltool_result;
pub use workflow::{
    API_FILES_MACRO, get_required_num_cores, is_workflow, parse_document, translate_api_step,
    translate_workflow,
};
