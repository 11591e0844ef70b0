//! Functions and constants for documentation links.

use once_cell::sync::OnceCell;

/// The reference documentation for the config file.
pub fn config_file_reference() -> &'static str {
    // This value is set by Cargo and evaluated at compile time.
    static LAZY: OnceCell<String> = OnceCell::new();
    LAZY.get_or_init(|| {
        let sha = super::build_sha();
        let home = super::repo_home();
        format!("{home}/blob/{sha}/docs/reference/config.md")
    })
}

/// The reference documentation for the tag-to-branch routing table.
pub fn routing_table_reference() -> &'static str {
    static LAZY: OnceCell<String> = OnceCell::new();
    LAZY.get_or_init(|| {
        let sha = super::build_sha();
        let home = super::repo_home();
        format!("{home}/blob/{sha}/docs/reference/routing.md")
    })
}
