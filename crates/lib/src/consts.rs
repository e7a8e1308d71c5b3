pub const APP_NAME: &str = "kiln";

/// File name of the per-package manifest.
pub const MANIFEST_FILENAME: &str = "package.json";

/// Directory that holds installed dependencies next to a manifest.
pub const MODULES_DIRNAME: &str = "node_modules";

/// Length of the truncated hash used in package keys.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Variable every emitted path is expressed relative to.
pub const SANDBOX_VAR: &str = "KILN__SANDBOX";

/// Variable pointing at the shared store of built packages.
pub const STORE_VAR: &str = "KILN__STORE";

/// When set, keys and the base environment are pinned for reproducible output.
pub const TEST_VAR: &str = "KILN__TEST";

/// Separator between a package prefix and the variable it namespaces.
pub const NAMESPACE_SEPARATOR: &str = "__";

/// Default name of the generated library-path configuration file.
pub const LIB_CONFIG_FILENAME: &str = "findlib.conf";
