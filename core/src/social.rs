//! Invite codes and the follow graph behind the friends leaderboard.

use crate::{
    error::{SimError, SimResult},
    store::Tx,
};

/// Omits 0, O, 1 and I.
pub const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_ATTEMPTS: usize = 8;

/// Map random bytes onto the invite alphabet.
pub fn invite_code_from_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(INVITE_CODE_LEN)
        .map(|b| INVITE_ALPHABET[*b as usize % INVITE_ALPHABET.len()] as char)
        .collect()
}

fn random_invite_code() -> String {
    invite_code_from_bytes(uuid::Uuid::new_v4().as_bytes())
}

/// Trim and uppercase a code typed by a player.
pub fn normalize_invite_code(raw: &str) -> SimResult<String> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(SimError::Invalid("invite code is required".into()));
    }
    Ok(code)
}

/// The player's invite code, allocating one on first sight.
pub fn ensure_invite_code(tx: &Tx<'_>, user_id: &str) -> SimResult<String> {
    if let Some(code) = tx.player_invite_code(user_id)? {
        return Ok(code);
    }
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = random_invite_code();
        if tx.player_by_invite_code(&code)?.is_none() {
            return Ok(code);
        }
    }
    Err(SimError::Invalid("could not allocate an invite code".into()))
}

fn followee(tx: &Tx<'_>, invite_code: &str) -> SimResult<String> {
    let code = normalize_invite_code(invite_code)?;
    tx.player_by_invite_code(&code)?
        .ok_or(SimError::NotFound { entity: "player" })
}

/// Follow the player behind `invite_code`. Returns false when already following.
pub fn follow(tx: &Tx<'_>, follower: &str, invite_code: &str) -> SimResult<bool> {
    if tx.player_invite_code(follower)?.is_none() {
        return Err(SimError::NotFound { entity: "player" });
    }
    let followee = followee(tx, invite_code)?;
    if followee == follower {
        return Err(SimError::Invalid("cannot follow yourself".into()));
    }
    let added = tx.insert_follow(follower, &followee)?;
    if added {
        log::info!("{follower} now follows {followee}");
    }
    Ok(added)
}

/// Stop following the player behind `invite_code`. Returns false when not following.
pub fn unfollow(tx: &Tx<'_>, follower: &str, invite_code: &str) -> SimResult<bool> {
    let followee = followee(tx, invite_code)?;
    tx.delete_follow(follower, &followee)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_only_the_invite_alphabet() {
        let code = invite_code_from_bytes(&[0, 31, 32, 255, 7, 8, 9, 10, 11, 12]);
        assert_eq!(code, "A9A9HJKL");
        assert_eq!(random_invite_code().len(), INVITE_CODE_LEN);
        assert!(random_invite_code().bytes().all(|b| INVITE_ALPHABET.contains(&b)));
    }

    #[test]
    fn typed_codes_are_trimmed_and_uppercased() {
        assert_eq!(normalize_invite_code("  ab12cd34 ").unwrap(), "AB12CD34");
        assert!(matches!(normalize_invite_code("   "), Err(SimError::Invalid(_))));
    }
}
