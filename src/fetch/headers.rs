//! Rotating realistic header sets for outbound REST calls.

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "en-US,en;q=0.8,de;q=0.5",
    "en-US,en;q=0.9,fr;q=0.6",
];

// Limited to encodings the HTTP client can transparently decode
const ACCEPT_ENCODINGS: &[&str] = &["gzip, deflate, br", "gzip, deflate", "gzip"];

/// One randomized header set for a single request attempt
pub fn rotated_header_set() -> Vec<(&'static str, &'static str)> {
    vec![
        ("User-Agent", pick(USER_AGENTS)),
        ("Accept", "application/json"),
        ("Accept-Language", pick(ACCEPT_LANGUAGES)),
        ("Accept-Encoding", pick(ACCEPT_ENCODINGS)),
    ]
}

fn pick(pool: &'static [&'static str]) -> &'static str {
    pool[fastrand::usize(0..pool.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_set_is_complete() {
        let set = rotated_header_set();
        let names: Vec<&str> = set.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"User-Agent"));
        assert!(names.contains(&"Accept-Language"));
        assert!(names.contains(&"Accept-Encoding"));
    }

    #[test]
    fn test_rotation_draws_from_pools() {
        for _ in 0..50 {
            let set = rotated_header_set();
            let ua = set.iter().find(|(n, _)| *n == "User-Agent").unwrap().1;
            assert!(USER_AGENTS.contains(&ua));
        }
    }
}
