use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Malformed CIDR block: {0}")]
    Malformed(String),

    #[error("Prefix /{0} is out of range")]
    InvalidPrefix(u8),

    #[error("Subnet {index} of size /{prefix} does not fit in {block}")]
    OutOfRange { block: String, prefix: u8, index: u32 },
}

/// An IPv4 network block such as `10.0.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, Error> {
        if prefix > 32 {
            return Err(Error::InvalidPrefix(prefix));
        }

        let network = Ipv4Addr::from(u32::from(address) & mask(prefix));
        return Ok(Self { network, prefix });
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of `/new_prefix` blocks this network can be split into.
    pub fn capacity(&self, new_prefix: u8) -> u64 {
        if new_prefix < self.prefix || new_prefix > 32 {
            return 0;
        }
        1u64 << (new_prefix - self.prefix)
    }

    /// The `index`-th `/new_prefix` block inside this network.
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Result<Ipv4Cidr, Error> {
        if new_prefix < self.prefix || new_prefix > 32 {
            return Err(Error::InvalidPrefix(new_prefix));
        }
        if u64::from(index) >= self.capacity(new_prefix) {
            return Err(Error::OutOfRange {
                block: self.to_string(),
                prefix: new_prefix,
                index,
            });
        }

        let size = 1u64 << (32 - new_prefix);
        let start = u64::from(u32::from(self.network)) + u64::from(index) * size;
        let start = u32::try_from(start).map_err(|_| Error::OutOfRange {
            block: self.to_string(),
            prefix: new_prefix,
            index,
        })?;

        return Ipv4Cidr::new(Ipv4Addr::from(start), new_prefix);
    }
}

fn mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = value
            .split_once('/')
            .ok_or_else(|| Error::Malformed(value.to_string()))?;

        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| Error::Malformed(value.to_string()))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| Error::Malformed(value.to_string()))?;

        let cidr = Ipv4Cidr::new(address, prefix)?;
        if cidr.network != address {
            return Err(Error::Malformed(value.to_string()));
        }

        return Ok(cidr);
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use super::Ipv4Cidr;

    #[test]
    fn parses_and_displays() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!("10.0.0.0/16", cidr.to_string());
        assert_eq!(16, cidr.prefix());
    }

    #[test]
    fn rejects_host_bits() {
        let result = "10.0.1.0/16".parse::<Ipv4Cidr>();
        match result.err().unwrap() {
            Error::Malformed(_) => {}
            _ => panic!("Expected `Malformed` error"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(true, "10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert_eq!(true, "nope/16".parse::<Ipv4Cidr>().is_err());
        assert_eq!(
            Err(Error::InvalidPrefix(33)),
            "10.0.0.0/33".parse::<Ipv4Cidr>()
        );
    }

    #[test]
    fn carves_subnets_in_order() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!("10.0.0.0/24", cidr.subnet(24, 0).unwrap().to_string());
        assert_eq!("10.0.1.0/24", cidr.subnet(24, 1).unwrap().to_string());
        assert_eq!("10.0.255.0/24", cidr.subnet(24, 255).unwrap().to_string());
        assert_eq!(256, cidr.capacity(24));
    }

    #[test]
    fn subnet_out_of_range() {
        let cidr: Ipv4Cidr = "10.0.0.0/23".parse().unwrap();
        match cidr.subnet(24, 2).err().unwrap() {
            Error::OutOfRange { index, .. } => assert_eq!(2, index),
            _ => panic!("Expected `OutOfRange` error"),
        }
        assert_eq!(Err(Error::InvalidPrefix(22)), cidr.subnet(22, 0));
    }
}
