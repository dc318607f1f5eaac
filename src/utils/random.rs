use rand::{RngCore, rng};

/// Random filler for handshake packets
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rng().fill_bytes(&mut payload);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_len() {
        assert_eq!(random_payload(1528).len(), 1528);
        assert!(random_payload(0).is_empty());
    }

    #[test]
    fn test_payloads_differ() {
        assert_ne!(random_payload(64), random_payload(64));
    }
}
