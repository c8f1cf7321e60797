//! Random value generator.
//!
//! Parameters:
//! - `length`: number of characters (random bytes for `base64`), default 32
//! - `alphabet`: `alphanumeric` (default), `hex` or `base64`

use async_trait::async_trait;
use base64::Engine;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use std::str::FromStr;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::secrets::registry::StoreDefinition;
use crate::secrets::store::{Capabilities, OriginateRequest, SecretStore, StoreKind};
use crate::secrets::value::SecretValue;

const DEFAULT_LENGTH: usize = 32;
const MAX_LENGTH: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Alphabet {
    #[default]
    Alphanumeric,
    Hex,
    Base64,
}

impl FromStr for Alphabet {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "alphanumeric" => Ok(Self::Alphanumeric),
            "hex" => Ok(Self::Hex),
            "base64" => Ok(Self::Base64),
            other => Err(format!("Unknown alphabet '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorStore {
    name: String,
    length: usize,
    alphabet: Alphabet,
}

impl GeneratorStore {
    pub fn new(name: impl Into<String>, length: usize, alphabet: Alphabet) -> Self {
        Self { name: name.into(), length, alphabet }
    }

    pub fn from_definition(definition: &StoreDefinition) -> Result<Self> {
        let length = definition.usize_param("length", DEFAULT_LENGTH)?;
        if length == 0 || length > MAX_LENGTH {
            return Err(Error::config(format!(
                "Store '{}': length must be between 1 and {}",
                definition.name, MAX_LENGTH
            )));
        }

        let alphabet = match definition.optional_param("alphabet")? {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| Error::config(format!("Store '{}': {}", definition.name, e)))?,
            None => Alphabet::default(),
        };

        Ok(Self::new(definition.name.clone(), length, alphabet))
    }

    fn generate(&self) -> String {
        match self.alphabet {
            Alphabet::Alphanumeric => {
                OsRng.sample_iter(&Alphanumeric).take(self.length).map(char::from).collect()
            }
            Alphabet::Hex => {
                let mut bytes = vec![0u8; self.length.div_ceil(2)];
                OsRng.fill_bytes(&mut bytes);
                let mut encoded = hex::encode(bytes);
                encoded.truncate(self.length);
                encoded
            }
            Alphabet::Base64 => {
                let mut bytes = vec![0u8; self.length];
                OsRng.fill_bytes(&mut bytes);
                base64::engine::general_purpose::STANDARD.encode(bytes)
            }
        }
    }
}

#[async_trait]
impl SecretStore for GeneratorStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Generator
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().originate()
    }

    async fn originate(&self, request: OriginateRequest<'_>) -> Result<SecretValue> {
        if request.dry_run {
            return Ok(SecretValue::placeholder(&self.name, Some(request.expiration_date)));
        }

        let value = SecretValue::new(self.generate(), Some(request.expiration_date));
        debug!(store = %self.name, fingerprint = %value.value().fingerprint(), "Generated new value");
        Ok(value)
    }
}
