mod common;

use common::world;
use stanks_core::{money, social::INVITE_CODE_LEN, SimError};

#[test]
fn every_player_keeps_one_invite_code() {
    let mut w = world();
    w.player("ana");
    w.player("ben");
    let ana = w.service.invite_code("ana").unwrap();
    let ben = w.service.invite_code("ben").unwrap();
    assert_eq!(ana.len(), INVITE_CODE_LEN);
    assert_ne!(ana, ben);

    w.service.ensure_player(&w.ctx, w.season, "ana", "Ana Renamed").unwrap();
    assert_eq!(w.service.invite_code("ana").unwrap(), ana);
    assert!(matches!(w.service.invite_code("nobody"), Err(SimError::NotFound { .. })));
}

#[test]
fn following_accepts_loosely_typed_codes() {
    let mut w = world();
    w.player("ana");
    w.player("ben");
    let ben = w.service.invite_code("ben").unwrap();

    let typed = format!("  {}  ", ben.to_lowercase());
    assert!(w.service.add_friend(&w.ctx, "ana", &typed).unwrap());
    assert!(!w.service.add_friend(&w.ctx, "ana", &ben).unwrap());
    assert_eq!(w.service.followees("ana").unwrap(), vec!["ben".to_string()]);
    assert!(w.service.followees("ben").unwrap().is_empty());
}

#[test]
fn bad_follows_are_rejected() {
    let mut w = world();
    w.player("ana");
    let own = w.service.invite_code("ana").unwrap();

    assert!(matches!(w.service.add_friend(&w.ctx, "ana", &own), Err(SimError::Invalid(_))));
    assert!(matches!(w.service.add_friend(&w.ctx, "ana", "   "), Err(SimError::Invalid(_))));
    assert!(matches!(
        w.service.add_friend(&w.ctx, "ana", "ZZZZZZZZ"),
        Err(SimError::NotFound { .. })
    ));
    assert!(matches!(
        w.service.add_friend(&w.ctx, "ghost", &own),
        Err(SimError::NotFound { .. })
    ));
    assert!(w.service.followees("ana").unwrap().is_empty());
}

#[test]
fn friends_board_ranks_the_viewer_and_followees_only() {
    let mut w = world();
    for user in ["ana", "ben", "cyd"] {
        w.player(user);
    }
    w.grant("ben", money::stonky(1_000));
    w.grant("cyd", money::stonky(5_000));
    let ben = w.service.invite_code("ben").unwrap();
    w.service.add_friend(&w.ctx, "ana", &ben).unwrap();

    let board = w.service.friends_leaderboard(w.season, "ana", 10).unwrap();
    let users: Vec<_> = board.iter().map(|r| (r.rank, r.user_id.as_str())).collect();
    assert_eq!(users, vec![(1, "ben"), (2, "ana")]);
    assert_eq!(board[0].invite_code, ben);
    assert_eq!(board[0].net_worth_micros, money::STARTER_BALANCE_MICROS + money::stonky(1_000));

    // Following is one-way.
    let board = w.service.friends_leaderboard(w.season, "ben", 10).unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, "ben");

    let board = w.service.friends_leaderboard(w.season, "ana", 1).unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, "ben");

    assert!(w.service.remove_friend(&w.ctx, "ana", &ben.to_lowercase()).unwrap());
    assert!(!w.service.remove_friend(&w.ctx, "ana", &ben).unwrap());
    let board = w.service.friends_leaderboard(w.season, "ana", 10).unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, "ana");
}

#[test]
fn the_global_board_carries_invite_codes() {
    let mut w = world();
    w.player("ana");
    w.player("ben");
    let board = w.service.leaderboard(w.season, 10).unwrap();
    assert_eq!(board.len(), 2);
    for row in &board {
        assert_eq!(row.invite_code, w.service.invite_code(&row.user_id).unwrap());
    }
}
