use const_format::formatcp;

pub const INACCEL_DOMAIN: &str = "inaccel";

/// Annotation and label keys below this prefix drive the injection.
pub const INACCEL_RESOURCE_PREFIX: &str = formatcp!("{}/", INACCEL_DOMAIN);

pub const INACCEL_VOLUME_NAME: &str = INACCEL_DOMAIN;
pub const INACCEL_CSI_DRIVER: &str = INACCEL_DOMAIN;
pub const INACCEL_VOLUME_MOUNT_PATH: &str = formatcp!("/var/lib/{}", INACCEL_DOMAIN);

pub const INACCEL_CERT_FILE_ENV: &str = "INACCEL_CERT_FILE";
pub const INACCEL_CERT_FILE: &str = formatcp!("/etc/{}/certs/ssl.pem", INACCEL_DOMAIN);
pub const INACCEL_KEY_FILE_ENV: &str = "INACCEL_KEY_FILE";
pub const INACCEL_KEY_FILE: &str = formatcp!("/etc/{}/private/ssl.key", INACCEL_DOMAIN);
pub const INACCEL_LOG_CONFIG_FILE_ENV: &str = "INACCEL_LOG_CONFIG_FILE";
pub const INACCEL_LOG_CONFIG_FILE: &str = formatcp!("/etc/{}/log4rs.yaml", INACCEL_DOMAIN);
pub const INACCEL_DEBUG_ENV: &str = "INACCEL_DEBUG";
