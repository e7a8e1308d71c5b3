use std::path::PathBuf;

/// Returns the user's home directory, if the environment names one.
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory, if the environment names one.
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn home_dir_reads_home() {
    temp_env::with_var("HOME", Some("/home/user"), || {
      assert_eq!(home_dir(), Some(PathBuf::from("/home/user")));
    });
  }

  #[test]
  #[serial]
  fn home_dir_unset_is_none() {
    temp_env::with_var("HOME", None::<&str>, || {
      assert_eq!(home_dir(), None);
    });
  }
}
