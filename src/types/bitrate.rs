use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

/// A bitrate in kilobits per second.
///
/// Written the way ffmpeg reads it: `5000k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Bitrate(u32);

impl Bitrate {
    pub fn from_kbps(kbps: u32) -> Self {
        Self(kbps)
    }

    pub fn kbps(self) -> u32 {
        self.0
    }
}

impl FromStr for Bitrate {
    type Err = Box<dyn std::error::Error + Sync + Send>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        let kbps: u32 = if let Some(num_prefix) = s.strip_suffix('k') {
            num_prefix.parse()?
        } else if let Some(num_prefix) = s.strip_suffix('m') {
            num_prefix
                .parse::<u32>()?
                .checked_mul(1000)
                .ok_or("Bitrate is too large")?
        } else {
            return Err(Box::from("Bitrate does not end with 'k' or 'M'"));
        };

        if kbps == 0 {
            Err(Box::from("Bitrate must be strictly positive"))
        } else {
            Ok(Self(kbps))
        }
    }
}

impl TryFrom<String> for Bitrate {
    type Error = Box<dyn std::error::Error + Sync + Send>;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}k", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffmpeg_notation() {
        assert_eq!("5000k".parse::<Bitrate>().unwrap().kbps(), 5000);
        assert_eq!("192K".parse::<Bitrate>().unwrap().kbps(), 192);
        assert_eq!("2M".parse::<Bitrate>().unwrap().kbps(), 2000);
        assert_eq!(Bitrate::from_kbps(4098).to_string(), "4098k");
    }

    #[test]
    fn rejects_bare_numbers_and_zero() {
        assert!("5000".parse::<Bitrate>().is_err());
        assert!("0k".parse::<Bitrate>().is_err());
        assert!("fast".parse::<Bitrate>().is_err());
    }
}
