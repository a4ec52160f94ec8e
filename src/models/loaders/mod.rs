pub mod artifact_loader;

pub use artifact_loader::{
    create_run_folder, load_json, load_review_sheet, review_sheet_path, sanitize_name, save_json,
    save_review_sheet,
};
