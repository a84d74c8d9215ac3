use rusqlite::Connection;
use teamhub_core::db::open_db_in_memory;
use teamhub_core::{
    ChangeFeed, FeedTopic, Identity, Membership, MembershipRepository, Pack, Role,
    SqliteMembershipRepository, SqliteTeamRepository, TeamError, TeamService,
};

type Teams<'c> = TeamService<SqliteMembershipRepository<'c>, SqliteTeamRepository<'c>>;

fn teams<'c>(conn: &'c Connection, feed: &ChangeFeed) -> Teams<'c> {
    TeamService::new(
        SqliteMembershipRepository::new(conn, feed.clone()),
        SqliteTeamRepository::new(conn),
    )
}

fn owner() -> Identity {
    Identity::new("owner", "owner@example.com")
}

fn add_member(conn: &Connection, feed: &ChangeFeed, team_id: &str, user_id: &str) {
    SqliteMembershipRepository::new(conn, feed.clone())
        .upsert_membership(&Membership::new(team_id, user_id, Role::Member))
        .unwrap();
}

#[test]
fn creator_becomes_admin_of_a_canonical_team() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let service = teams(&conn, &feed);

    let team = service.create_team(&owner(), "  Famille Martin ", Pack::Family).unwrap();
    assert_eq!(team.name, "Famille Martin");
    assert_eq!(team.pack, "famille");
    assert_eq!(team.created_by, "owner");

    let members = service.list_members(&owner(), &team.id).unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, Role::Admin);
    assert_eq!(members[0].email.as_deref(), Some("owner@example.com"));
    assert_eq!(service.get_team(&team.id).unwrap(), team);
}

#[test]
fn member_email_lookup_is_case_insensitive_and_survives_role_writes() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let repo = SqliteMembershipRepository::new(&conn, feed.clone());

    let ana = Membership::new("t1", "u1", Role::Member).with_email(" Ana@Example.com");
    repo.upsert_membership(&ana).unwrap();
    repo.upsert_membership(&Membership::new("t1", "u1", Role::Admin))
        .unwrap();

    let found = repo.find_by_email("t1", "ANA@example.com ").unwrap().unwrap();
    assert_eq!(found.user_id, "u1");
    assert_eq!(found.role, Role::Admin);
    assert_eq!(found.email.as_deref(), Some("ana@example.com"));
    assert!(repo.find_by_email("t2", "ana@example.com").unwrap().is_none());
}

#[test]
fn blank_team_name_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let err = teams(&conn, &feed)
        .create_team(&owner(), "   ", Pack::Friends)
        .unwrap_err();
    assert!(matches!(err, TeamError::Validation(_)));
}

#[test]
fn repeated_upsert_keeps_one_membership_per_pair() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let repo = SqliteMembershipRepository::new(&conn, feed.clone());

    let mut first = Membership::new("t1", "u1", Role::Member);
    first.joined_at_ms = 100;
    repo.upsert_membership(&first).unwrap();
    let mut second = Membership::new("t1", "u1", Role::Admin);
    second.joined_at_ms = 999;
    repo.upsert_membership(&second).unwrap();

    let stored = repo.list_for_team("t1").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, Role::Admin);
    assert_eq!(stored[0].joined_at_ms, 100);
    assert_eq!(stored[0].id(), "t1_u1");
}

#[test]
fn admins_change_roles_and_members_cannot() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let service = teams(&conn, &feed);
    let team = service.create_team(&owner(), "Coloc", Pack::Roommates).unwrap();
    add_member(&conn, &feed, &team.id, "u2");
    add_member(&conn, &feed, &team.id, "u3");
    let member = Identity::new("u2", "u2@example.com");

    let err = service
        .set_role(&member, &team.id, "u3", Role::Admin)
        .unwrap_err();
    match err {
        TeamError::PermissionDenied { user_id, action, .. } => {
            assert_eq!(user_id, "u2");
            assert_eq!(action, "change roles");
        }
        other => panic!("unexpected error: {other}"),
    }

    service.set_role(&owner(), &team.id, "u2", Role::Admin).unwrap();
    assert_eq!(service.toggle_role(&member, &team.id, "u3").unwrap(), Role::Admin);
    assert_eq!(service.toggle_role(&member, &team.id, "u3").unwrap(), Role::Member);

    assert!(matches!(
        service.set_role(&owner(), &team.id, "nobody", Role::Admin),
        Err(TeamError::NotAMember { .. })
    ));
}

#[test]
fn remove_and_leave_delete_the_membership() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let service = teams(&conn, &feed);
    let team = service.create_team(&owner(), "Projet", Pack::Project).unwrap();
    add_member(&conn, &feed, &team.id, "u2");
    add_member(&conn, &feed, &team.id, "u3");

    let mut team_feed = feed.subscribe(FeedTopic::TeamMembers(team.id.clone()));
    service.remove_member(&owner(), &team.id, "u2").unwrap();
    assert_eq!(team_feed.poll(), teamhub_core::feed::FeedPoll::Changed);
    assert!(matches!(
        service.remove_member(&owner(), &team.id, "u2"),
        Err(TeamError::NotAMember { .. })
    ));

    let leaver = Identity::new("u3", "u3@example.com");
    service.leave_team(&leaver, &team.id).unwrap();
    assert!(matches!(
        service.list_members(&leaver, &team.id),
        Err(TeamError::NotAMember { .. })
    ));
    assert_eq!(service.list_members(&owner(), &team.id).unwrap().len(), 1);
}

#[test]
fn rename_is_admin_only_and_teams_for_skips_dangling() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let service = teams(&conn, &feed);
    let team = service.create_team(&owner(), "Avant", Pack::Friends).unwrap();
    add_member(&conn, &feed, "ghost-team", "owner");
    add_member(&conn, &feed, &team.id, "u2");

    assert!(matches!(
        service.rename_team(&Identity::new("u2", "u2@example.com"), &team.id, "Pirate"),
        Err(TeamError::PermissionDenied { .. })
    ));
    service.rename_team(&owner(), &team.id, "Après").unwrap();

    let owned = service.teams_for(&owner()).unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].name, "Après");
    assert!(matches!(
        service.get_team("ghost-team"),
        Err(TeamError::NotFound { .. })
    ));
}
