use derive_more::Display;

/// The text a packet is generated from, and the packet id derived from it.
///
/// Two scan points with the same descriptor compile into the same packet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("{text}")]
pub struct Descriptor {
    /// Canonical description of the scan point, calibration and channels
    pub text: String,
    /// Lowercase hexadecimal MD5 hash of `text`
    pub id: String,
}

impl Descriptor {
    /// Creates a new [`Descriptor`].
    #[must_use]
    pub fn new(text: String) -> Self {
        let id = packet_id(&text);
        Self { text, id }
    }
}

/// The id of the packet generated from `descriptor`.
#[must_use]
pub fn packet_id(descriptor: &str) -> String {
    format!("{:x}", md5::compute(descriptor.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("d41d8cd98f00b204e9800998ecf8427e", "")]
    #[case("900150983cd24fb0d6963f7d28e17f72", "abc")]
    #[test]
    fn md5_hex(#[case] expect: &str, #[case] text: &str) {
        assert_eq!(expect, packet_id(text));
        assert_eq!(expect, Descriptor::new(text.to_owned()).id);
    }
}
