use std::fmt;
use std::str::FromStr;

/// Protocol version number with up to four components, as exchanged during
/// negotiation. The client advertises protocol `1.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Version { major, minor, build: 0, revision: 0 }
    }

    pub fn full(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Version { major, minor, build, revision }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision != 0 {
            write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
        } else if self.build != 0 {
            write!(f, "{}.{}.{}", self.major, self.minor, self.build)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for Version {
    type Err = String;

    /// Accepts two to four dot separated numeric components.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err("version string is empty".to_string());
        }

        let components: Vec<&str> = input.split('.').collect();

        if components.len() < 2 || components.len() > 4 {
            return Err(format!("version string {:?} must have 2 to 4 components", input));
        }

        let mut parsed = [0u32; 4];
        for (index, component) in components.iter().enumerate() {
            parsed[index] = component
                .parse::<u32>()
                .map_err(|_| format!("version component {:?} is not a number", component))?;
        }

        Ok(Version {
            major: parsed[0],
            minor: parsed[1],
            build: parsed[2],
            revision: parsed[3],
        })
    }
}
