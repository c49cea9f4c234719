//! Country to backend origin mapping

use std::collections::HashMap;
use tracing::info;
use url::Url;

use crate::error::RegistryError;

/// Static mapping from country code to backend base origin.
///
/// Built once at startup and read-only afterwards. Country codes are matched
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, String>,
}

impl BackendRegistry {
    /// Build a registry, validating every origin
    pub fn new<I, K, V>(backends: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = HashMap::new();

        for (country, origin) in backends {
            let country = country.into().trim().to_ascii_lowercase();
            let origin = origin.into().trim().to_string();
            validate_origin(&country, &origin)?;
            map.insert(country, origin);
        }

        info!("Loaded {} backend(s)", map.len());
        Ok(Self { backends: map })
    }

    /// Build a registry from `<country>=<origin>` arguments
    pub fn from_args<I, S>(args: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pairs = args
            .into_iter()
            .map(|arg| parse_backend_arg(arg.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(pairs)
    }

    /// Backend origin for a country code
    pub fn resolve(&self, country: &str) -> Option<&str> {
        self.backends
            .get(&country.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Known country codes, sorted
    pub fn countries(&self) -> Vec<&str> {
        let mut countries: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        countries.sort_unstable();
        countries
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Split `us=http://localhost:9001` on the first `=`
pub fn parse_backend_arg(arg: &str) -> Result<(String, String), RegistryError> {
    match arg.split_once('=') {
        Some((country, origin)) if !country.trim().is_empty() && !origin.trim().is_empty() => {
            Ok((country.to_string(), origin.to_string()))
        }
        _ => Err(RegistryError::InvalidArgument(arg.to_string())),
    }
}

fn validate_origin(country: &str, origin: &str) -> Result<(), RegistryError> {
    let invalid = || RegistryError::InvalidOrigin {
        country: country.to_string(),
        origin: origin.to_string(),
    };

    let url = Url::parse(origin).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(invalid());
    }
    Ok(())
}
