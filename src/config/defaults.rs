//! Default configuration values

/// Parent image value meaning "build from an empty base"
pub const SCRATCH_PARENT: &str = "scratch";

/// Config file read when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Layer name used when neither CLI nor config names one
pub const DEFAULT_LAYER_NAME: &str = "base";

/// Tag applied when no publish tags are configured
pub const DEFAULT_PUBLISH_TAG: &str = "latest";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Repository priority when a repo does not set one (zypper only)
pub const DEFAULT_REPO_PRIORITY: u32 = 99;

/// Repository directory used by zypper
pub const ZYPPER_REPO_DIR: &str = "/etc/zypp/repos.d";

/// Repository directory used by dnf inside an existing image
pub const DNF_REPO_DIR: &str = "/etc/yum.repos.d";

/// dnf repository directory for scratch builds, relative to the home directory
pub const DNF_SCRATCH_REPO_DIR: &str = ".pkg_repos/yum.repos.d";

/// dnf main configuration file, relative to the image root
pub const DNF_CONF: &str = "etc/dnf/dnf.conf";

/// Resolver configuration, relative to the image root
pub const RESOLV_CONF: &str = "etc/resolv.conf";

/// Shell test that drops `/etc/resolv.conf` inside a container when it is a link
pub const RESOLV_LINK_REMOVAL: &str = "if [ -L /etc/resolv.conf ]; then rm -f /etc/resolv.conf; fi";

/// Package manager exit code for a failed install
pub const EXIT_INSTALL_FAILED: i32 = 104;

/// Package manager exit code for failed RPM post-install scripts
pub const EXIT_POSTSCRIPT_FAILED: i32 = 107;

/// Highest accepted ansible verbosity (`-vvvv`)
pub const MAX_ANSIBLE_VERBOSITY: u8 = 4;

/// Prefix for the standard image labels
pub const LABEL_PREFIX: &str = "org.openchami.image";

/// Container tool binary
pub const CONTAINER_TOOL: &str = "buildah";

/// Playbook runner binary
pub const PLAYBOOK_TOOL: &str = "ansible-playbook";
