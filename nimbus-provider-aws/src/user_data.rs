//! Boot script encoding for RunInstances
//!
//! The EC2 API expects `UserData` as base64; the SDK sends it as given.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode a boot script for the `UserData` parameter
pub fn encode(script: &str) -> String {
    STANDARD.encode(script.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_shebang_line() {
        assert_eq!(encode("#!/bin/bash\n"), "IyEvYmluL2Jhc2gK");
    }

    #[test]
    fn encoded_boot_script_decodes_verbatim() {
        let encoded = encode(nimbus_core::blueprint::BOOT_SCRIPT);
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, nimbus_core::blueprint::BOOT_SCRIPT.as_bytes());
    }
}
