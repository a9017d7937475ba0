pub mod merge;
pub mod process_case;
pub mod tagging;
pub mod tetrahedralize;
