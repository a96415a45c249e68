use std::time::{SystemTime, UNIX_EPOCH};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Random lowercase base-36 token of `len` characters.
pub(crate) fn random_base36(len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        out.push(char::from(BASE36[fastrand::usize(..BASE36.len())]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::random_base36;

    #[test]
    fn random_base36_shape() {
        let token = random_base36(11);
        assert_eq!(token.len(), 11);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        assert_ne!(random_base36(16), random_base36(16));
    }
}
