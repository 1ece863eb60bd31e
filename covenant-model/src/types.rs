//! Strong types for byte arrays
//!
//! Semantic newtypes for the fixed-size byte arrays that cross the engine:
//! content hashes, Ed25519 public keys and Ed25519 signatures.

use std::fmt;

/// Defines a fixed-size byte array newtype with hex formatting and the usual
/// conversions.
///
/// Args:
/// - $name: the struct name
/// - $len: array size in bytes
/// - $doc: documentation string
/// - $derives: extra traits to derive
macro_rules! define_bytes {
    ($name:ident, $len:expr, $doc:expr, [$($derives:ident),*]) => {
        #[doc = $doc]
        #[derive(Clone, Copy, $($derives),*)]
        #[repr(transparent)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width of the value in bytes.
            pub const LEN: usize = $len;

            /// Returns the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns an owned copy of the bytes, as stored in protobuf `bytes` fields.
            pub fn to_vec(&self) -> Vec<u8> {
                self.0.to_vec()
            }

            /// Parse from a hex string.
            pub fn from_hex(hex_str: &str) -> Result<Self, String> {
                let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {}", e))?;
                Self::try_from(bytes.as_slice()).map_err(|_| {
                    format!("expected {} hex characters, got {}", $len * 2, hex_str.len())
                })
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(wrapper: $name) -> [u8; $len] {
                wrapper.0
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(self, f)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                fmt::Display::fmt(self, f)?;
                write!(f, ")")
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;
            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                Ok(Self(<[u8; $len]>::try_from(slice)?))
            }
        }
    };
}

define_bytes!(
    Hash,
    32,
    "32-byte content hash (BLAKE3)",
    [PartialEq, Eq, Hash, Default, PartialOrd, Ord]
);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Parse a hash carried in a protobuf `bytes` field.
    ///
    /// Returns `None` for an empty field (no content reference) and for
    /// values of the wrong width.
    pub fn from_proto(bytes: &[u8]) -> Option<Hash> {
        if bytes.is_empty() {
            return None;
        }
        Hash::try_from(bytes).ok()
    }
}

define_bytes!(
    PubKey,
    32,
    "32-byte Ed25519 public key",
    [PartialEq, Eq, Hash, Default, PartialOrd, Ord]
);

define_bytes!(Signature, 64, "64-byte Ed25519 signature", [PartialEq, Eq]);
