use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::error::GatewayError;

const HALF: usize = 4;

/// Short identifier a listener is reachable under: `XXXX-XXXX`, `[A-Za-z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut id: String = (0..HALF).map(|_| rng.sample(Alphanumeric) as char).collect();
        id.push('-');
        id.extend((0..HALF).map(|_| rng.sample(Alphanumeric) as char));
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = match s.split_once('-') {
            Some((a, b)) => [a, b]
                .iter()
                .all(|half| half.len() == HALF && half.bytes().all(|c| c.is_ascii_alphanumeric())),
            None => false,
        };
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(GatewayError::InvalidPeerId(s.to_string()))
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
