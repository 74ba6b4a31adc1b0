use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::{fs, io, path::Path};
use validator::{Validate, ValidationError};

use crate::cidr::Ipv4Cidr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// Everything the stack units need to know about the target deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(length(min = 1, max = 48), custom = "validate_app_name")]
    pub app_name: String,

    /// Passed through as given; CloudFormation rejects unknown accounts.
    pub account: Option<String>,

    pub region: Option<String>,

    #[validate]
    pub network: NetworkConfig,

    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_network_layout"))]
pub struct NetworkConfig {
    #[validate(custom = "validate_cidr")]
    pub cidr: String,

    #[validate(range(min = 2, max = 6))]
    pub max_azs: u8,

    #[validate(range(min = 16, max = 28))]
    pub subnet_prefix: u8,

    /// Explicit zone names. When absent the zones are selected from the
    /// deployment region at deploy time.
    pub availability_zones: Option<Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("PulseLogic"),
            account: None,
            region: None,
            network: NetworkConfig::default(),
            tags: BTreeMap::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: String::from("10.0.0.0/16"),
            max_azs: 2,
            subnet_prefix: 24,
            availability_zones: None,
        }
    }
}

impl AppConfig {
    /// Command line and environment values take precedence over the file.
    pub fn with_environment(mut self, account: Option<String>, region: Option<String>) -> Self {
        if account.is_some() {
            self.account = account;
        }
        if region.is_some() {
            self.region = region;
        }
        self
    }

    pub fn environment(&self) -> Environment {
        Environment {
            account: self.account.clone(),
            region: self.region.clone(),
        }
    }
}

/// Target account and region. `None` means "resolved by the provider".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl Environment {
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

pub fn parse(path: &Path) -> Result<AppConfig, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let config: AppConfig = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    validate(&config)?;

    return Ok(config);
}

pub fn validate(config: &AppConfig) -> Result<(), Error> {
    match config.validate() {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::ValidationError(error.to_string())),
    }
}

fn validate_app_name(app_name: &str) -> Result<(), ValidationError> {
    let mut chars = app_name.chars();
    let starts_with_letter = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new(
            "The app name has to start with a letter and contain only letters and digits",
        ));
    }

    return Ok(());
}

fn validate_cidr(cidr: &str) -> Result<(), ValidationError> {
    match cidr.parse::<Ipv4Cidr>() {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new(
            "The network CIDR has to be an IPv4 block such as `10.0.0.0/16`",
        )),
    }
}

fn validate_network_layout(network: &NetworkConfig) -> Result<(), ValidationError> {
    if let Some(zones) = &network.availability_zones {
        if zones.len() < usize::from(network.max_azs) {
            return Err(ValidationError::new(
                "Fewer availability zones listed than `max_azs`",
            ));
        }

        let distinct: BTreeSet<&String> = zones
            .iter()
            .take(usize::from(network.max_azs))
            .collect();
        if distinct.len() < usize::from(network.max_azs) {
            return Err(ValidationError::new(
                "The availability zones used by the network have to be distinct",
            ));
        }
    }

    // Malformed CIDRs are reported by `validate_cidr`.
    let cidr = match network.cidr.parse::<Ipv4Cidr>() {
        Ok(cidr) => cidr,
        Err(_) => return Ok(()),
    };

    // One public and one isolated subnet per zone.
    let needed = u64::from(network.max_azs) * 2;
    if cidr.capacity(network.subnet_prefix) < needed {
        return Err(ValidationError::new(
            "The network CIDR is too small for the requested subnets",
        ));
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use super::parse;
    use super::AppConfig;
    use super::Environment;
    use super::Error;
    use tempfile::tempdir;

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "Not yaml").unwrap();

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn single_availability_zone_is_rejected() {
        let mut config = AppConfig::default();
        config.network.max_azs = 1;

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", serde_yaml::to_string(&config).unwrap()).unwrap();

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn bad_cidr_and_app_name_are_rejected() {
        let mut config = AppConfig::default();
        config.network.cidr = String::from("10.0.0.0/40");
        assert_eq!(true, super::validate(&config).is_err());

        let mut config = AppConfig::default();
        config.app_name = String::from("Pulse Logic");
        assert_eq!(true, super::validate(&config).is_err());
    }

    #[test]
    fn duplicate_availability_zones_are_rejected() {
        let mut config = AppConfig::default();
        config.network.availability_zones = Some(vec![
            String::from("eu-west-1a"),
            String::from("eu-west-1a"),
        ]);

        match super::validate(&config).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }

        // Only the zones the network actually uses have to differ.
        config.network.availability_zones = Some(vec![
            String::from("eu-west-1a"),
            String::from("eu-west-1b"),
            String::from("eu-west-1a"),
        ]);
        assert_eq!(true, super::validate(&config).is_ok());
    }

    #[test]
    fn account_is_passed_through_unchecked() {
        let config = AppConfig::default().with_environment(Some(String::from("12345")), None);
        assert_eq!(true, super::validate(&config).is_ok());
        assert_eq!("aws://12345/unknown-region", config.environment().uri());
    }

    #[test]
    fn network_too_small_is_rejected() {
        let mut config = AppConfig::default();
        config.network.cidr = String::from("10.0.0.0/24");
        config.network.subnet_prefix = 26;
        config.network.max_azs = 3;

        match super::validate(&config).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn parses_the_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(
            file,
            "app_name: PulseLogic\nregion: eu-west-1\nnetwork:\n  cidr: 10.1.0.0/16\n  availability_zones: [eu-west-1a, eu-west-1b]\ntags:\n  team: platform"
        )
        .unwrap();

        let config = parse(&file_path).unwrap();
        assert_eq!("10.1.0.0/16", config.network.cidr);
        assert_eq!(2, config.network.max_azs);
        assert_eq!(Some(String::from("eu-west-1")), config.region);
        assert_eq!(None, config.account);
        assert_eq!(Some(&String::from("platform")), config.tags.get("team"));
    }

    #[test]
    fn environment_overrides_and_uri() {
        let config = AppConfig::default()
            .with_environment(Some(String::from("123456789012")), None);
        assert_eq!(
            Environment {
                account: Some(String::from("123456789012")),
                region: None,
            },
            config.environment()
        );
        assert_eq!(
            "aws://123456789012/unknown-region",
            config.environment().uri()
        );
    }
}
