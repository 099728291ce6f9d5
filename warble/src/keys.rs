//! Storage keys used by the Warble handlers.

const USER: &str = "user_";
const WARBLE: &str = "warble_";

/// Ids of every warble `username` posted. Present once the user registers.
pub fn user_warbles(username: &str) -> String {
    format!("user_warbles_{USER}{username}")
}

pub fn user_followers(username: &str) -> String {
    format!("user_followers_{USER}{username}")
}

pub fn user_followings(username: &str) -> String {
    format!("user_followings_{USER}{username}")
}

pub fn warble(id: &str) -> String {
    format!("{WARBLE}{id}")
}

/// Ids of the direct replies to warble `id`.
pub fn warble_thread(id: &str) -> String {
    format!("warble_thread_{WARBLE}{id}")
}

pub fn hashtag(tag: &str) -> String {
    format!("hashtag_{tag}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(user_warbles("alice"), "user_warbles_user_alice");
        assert_eq!(user_followers("alice"), "user_followers_user_alice");
        assert_eq!(user_followings("alice"), "user_followings_user_alice");
        assert_eq!(warble("123"), "warble_123");
        assert_eq!(warble_thread("123"), "warble_thread_warble_123");
        assert_eq!(hashtag("foo"), "hashtag_foo");
    }
}
