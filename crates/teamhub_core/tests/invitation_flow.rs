use rusqlite::Connection;
use std::cell::RefCell;
use teamhub_core::db::open_db_in_memory;
use teamhub_core::{
    ChangeFeed, CoreConfig, Identity, Invitation, InvitationEmail, InvitationMailer,
    InvitationRef, InvitationRepository, InvitationService, MailerError, MembershipRepository,
    MembershipResolver, ModuleId, Pack, Role, SqliteInvitationRepository,
    SqliteMembershipRepository, SqliteTeamRepository, Team, TeamError, TeamService,
};

type Invitations<'c> = InvitationService<
    SqliteInvitationRepository<'c>,
    SqliteMembershipRepository<'c>,
    SqliteTeamRepository<'c>,
>;

#[derive(Default)]
struct RecordingMailer {
    sent: RefCell<Vec<InvitationEmail>>,
}

impl InvitationMailer for RecordingMailer {
    fn send_invitation_email(&self, email: &InvitationEmail) -> Result<(), MailerError> {
        self.sent.borrow_mut().push(email.clone());
        Ok(())
    }
}

struct FailingMailer;

impl InvitationMailer for FailingMailer {
    fn send_invitation_email(&self, _email: &InvitationEmail) -> Result<(), MailerError> {
        Err(MailerError("smtp unreachable".to_string()))
    }
}

fn admin() -> Identity {
    Identity::new("admin-1", "alice@example.com").with_display_name("Alice")
}

fn bob() -> Identity {
    Identity::new("bob-1", "bob@example.com")
}

fn invitations<'c>(conn: &'c Connection, feed: &ChangeFeed) -> Invitations<'c> {
    InvitationService::new(
        SqliteInvitationRepository::new(conn),
        SqliteMembershipRepository::new(conn, feed.clone()),
        SqliteTeamRepository::new(conn),
    )
}

fn create_team(conn: &Connection, feed: &ChangeFeed, pack: Pack) -> Team {
    TeamService::new(
        SqliteMembershipRepository::new(conn, feed.clone()),
        SqliteTeamRepository::new(conn),
    )
    .create_team(&admin(), "Appart Lyon", pack)
    .unwrap()
}

fn invite_bob(service: &Invitations<'_>, team: &Team) -> Invitation {
    service
        .invite(&admin(), &team.id, "Bob@Example.com", None, &RecordingMailer::default())
        .unwrap()
        .invitation
}

fn member_count(conn: &Connection, feed: &ChangeFeed, team_id: &str) -> usize {
    SqliteMembershipRepository::new(conn, feed.clone())
        .list_for_team(team_id)
        .unwrap()
        .len()
}

#[test]
fn invited_user_joins_as_member_and_sees_team_modules() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Roommates);
    let service = invitations(&conn, &feed);
    let mailer = RecordingMailer::default();

    let outcome = service
        .invite(&admin(), &team.id, " Bob@Example.com ", None, &mailer)
        .unwrap();
    assert!(outcome.created);
    assert!(outcome.email_sent);
    assert_eq!(outcome.invitation.email, "bob@example.com");
    assert_eq!(outcome.invitation.team_name, "Appart Lyon");
    assert_eq!(outcome.invitation.invited_by.as_deref(), Some("admin-1"));

    let sent = mailer.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "bob@example.com");
    assert_eq!(sent[0].recipient_first_name, "inconnu");
    assert_eq!(
        sent[0].link,
        format!(
            "maisonplus://invitation?email=bob%40example.com&id={}",
            outcome.invitation.id
        )
    );

    let loaded = service.load_invitation(&outcome.invitation.id).unwrap();
    let accepted = service.accept(&loaded, Some(&bob())).unwrap();
    assert_eq!(accepted.membership.role, Role::Member);
    assert_eq!(accepted.membership.id(), format!("{}_bob-1", team.id));
    assert!(!accepted.already_member);
    assert!(accepted.invitation_deleted);
    assert!(matches!(
        service.load_invitation(&loaded.id),
        Err(TeamError::NotFound { .. })
    ));

    let resolver = MembershipResolver::new(
        SqliteMembershipRepository::new(&conn, feed.clone()),
        SqliteTeamRepository::new(&conn),
    );
    let view = resolver.snapshot("bob-1").unwrap();
    assert_eq!(view.active_team_id.as_deref(), Some(team.id.as_str()));
    assert_eq!(view.role, Some(Role::Member));
    assert!(view.is_module_enabled(ModuleId::Budget));
    assert!(!view.is_module_enabled(ModuleId::Notes));
}

#[test]
fn accepting_twice_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    service.accept(&invitation, Some(&bob())).unwrap();
    let again = service.accept(&invitation, Some(&bob())).unwrap();

    assert!(again.already_member);
    assert!(!again.invitation_deleted);
    assert_eq!(again.membership.role, Role::Member);
    assert_eq!(member_count(&conn, &feed, &team.id), 2);
}

#[test]
fn partially_applied_acceptance_completes_on_retry() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    // Membership written, invitation delete lost.
    conn.execute(
        "INSERT INTO memberships (id, team_id, user_id, role, joined_at)
         VALUES (?1, ?2, 'bob-1', 'member', 1);",
        [format!("{}_bob-1", team.id), team.id.clone()],
    )
    .unwrap();

    let outcome = service.accept(&invitation, Some(&bob())).unwrap();
    assert!(outcome.already_member);
    assert!(outcome.invitation_deleted);
    assert_eq!(member_count(&conn, &feed, &team.id), 2);
}

#[test]
fn acceptance_never_downgrades_an_admin() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);

    // Issued before the admin's email was recorded on the membership.
    let invitation = Invitation::new("alice@example.com", &team.id, &team.name, None);
    SqliteInvitationRepository::new(&conn)
        .create_invitation(&invitation)
        .unwrap();

    let outcome = service.accept(&invitation, Some(&admin())).unwrap();
    assert!(outcome.already_member);
    assert_eq!(outcome.membership.role, Role::Admin);
}

#[test]
fn inviting_a_current_member_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);
    service.accept(&invitation, Some(&bob())).unwrap();
    let mailer = RecordingMailer::default();

    for email in [" Alice@Example.com", "bob@example.com"] {
        match service
            .invite(&admin(), &team.id, email, None, &mailer)
            .unwrap_err()
        {
            TeamError::AlreadyMember { email: rejected, team_id } => {
                assert_eq!(rejected, email.trim().to_lowercase());
                assert_eq!(team_id, team.id);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(mailer.sent.borrow().is_empty());
    assert!(service.list_pending(&admin(), &team.id).unwrap().is_empty());
}

#[test]
fn member_of_another_team_can_still_be_invited() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let first = create_team(&conn, &feed, Pack::Family);
    let second = create_team(&conn, &feed, Pack::Friends);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &first);
    service.accept(&invitation, Some(&bob())).unwrap();

    let outcome = service
        .invite(&admin(), &second.id, "bob@example.com", None, &RecordingMailer::default())
        .unwrap();
    assert!(outcome.created);
}

#[test]
fn invitation_already_marked_accepted_creates_no_membership() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    conn.execute(
        "UPDATE invitations SET status = 'accepted' WHERE id = ?1;",
        [&invitation.id],
    )
    .unwrap();

    let err = service.accept(&invitation, Some(&bob())).unwrap_err();
    assert!(matches!(err, TeamError::NotFound { .. }));
    assert_eq!(member_count(&conn, &feed, &team.id), 1);
}

#[test]
fn recipient_check_ignores_case_and_whitespace() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Friends);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    assert!(service.recipient_matches(&invitation, "  BOB@Example.COM "));
    let shouting_bob = Identity::new("bob-1", "BOB@EXAMPLE.COM");
    service.accept(&invitation, Some(&shouting_bob)).unwrap();
}

#[test]
fn wrong_recipient_leaves_invitation_pending() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Friends);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    let carol = Identity::new("carol-1", "carol@example.com");
    match service.accept(&invitation, Some(&carol)).unwrap_err() {
        TeamError::WrongRecipient { required, current } => {
            assert_eq!(required, "bob@example.com");
            assert_eq!(current, "carol@example.com");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(service.load_invitation(&invitation.id).unwrap().is_pending());
    assert_eq!(member_count(&conn, &feed, &team.id), 1);
}

#[test]
fn signed_out_acceptance_is_resumed_after_sign_in() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Project);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    let err = service.accept(&invitation, None).unwrap_err();
    assert!(matches!(err, TeamError::AuthenticationRequired));
    assert_eq!(
        service.pending_reference().unwrap(),
        Some(InvitationRef::new("bob@example.com", invitation.id.clone()))
    );

    let resumed = service.resume_pending(&bob()).unwrap().unwrap();
    assert_eq!(resumed.membership.team_id, team.id);
    assert_eq!(service.pending_reference().unwrap(), None);
    assert!(service.resume_pending(&bob()).unwrap().is_none());
}

#[test]
fn signed_out_acceptance_requires_sign_in_whatever_the_invitation() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    let wrong_recipient = InvitationRef::new("carol@example.com", invitation.id.clone());
    assert!(matches!(
        service.accept_ref(&wrong_recipient, None),
        Err(TeamError::AuthenticationRequired)
    ));
    let missing = InvitationRef::new("bob@example.com", "missing");
    assert!(matches!(
        service.accept_ref(&missing, None),
        Err(TeamError::AuthenticationRequired)
    ));

    service.revoke(&admin(), &invitation.id).unwrap();
    assert!(matches!(
        service.accept(&invitation, None),
        Err(TeamError::AuthenticationRequired)
    ));
    assert_eq!(member_count(&conn, &feed, &team.id), 1);
}

#[test]
fn signed_out_acceptance_survives_an_unwritable_pending_slot() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    conn.execute_batch("DROP TABLE pending_invitation;").unwrap();

    let err = service.accept(&invitation, None).unwrap_err();
    assert!(matches!(err, TeamError::AuthenticationRequired));
    assert_eq!(err.code(), "authentication_required");
}

#[test]
fn later_deferred_acceptance_replaces_the_pending_slot() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Project);
    let service = invitations(&conn, &feed);
    let first = invite_bob(&service, &team);
    let second = service
        .invite(&admin(), &team.id, "dan@example.com", None, &RecordingMailer::default())
        .unwrap()
        .invitation;

    let _ = service.accept(&first, None);
    let _ = service.accept(&second, None);
    assert_eq!(
        service.pending_reference().unwrap().map(|reference| reference.id),
        Some(second.id)
    );
}

#[test]
fn mail_failure_keeps_the_invitation() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);

    let outcome = service
        .invite(&admin(), &team.id, "bob@example.com", Some("Bob"), &FailingMailer)
        .unwrap();
    assert!(outcome.created);
    assert!(!outcome.email_sent);

    let pending = service.list_pending(&admin(), &team.id).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, outcome.invitation.id);

    let mailer = RecordingMailer::default();
    let resent = service
        .resend(&admin(), &outcome.invitation.id, Some(" Bob "), &mailer)
        .unwrap();
    assert!(resent.email_sent);
    assert_eq!(mailer.sent.borrow()[0].recipient_first_name, "Bob");
}

#[test]
fn repeated_invite_reuses_the_pending_invitation() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let mailer = RecordingMailer::default();

    let first = service
        .invite(&admin(), &team.id, "bob@example.com", None, &mailer)
        .unwrap();
    let second = service
        .invite(&admin(), &team.id, "BOB@example.com", None, &mailer)
        .unwrap();

    assert!(!second.created);
    assert_eq!(second.invitation.id, first.invitation.id);
    assert_eq!(service.list_pending(&admin(), &team.id).unwrap().len(), 1);
    assert_eq!(mailer.sent.borrow().len(), 2);
}

#[test]
fn only_admins_manage_invitations() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);
    service.accept(&invitation, Some(&bob())).unwrap();

    let mailer = RecordingMailer::default();
    let err = service
        .invite(&bob(), &team.id, "eve@example.com", None, &mailer)
        .unwrap_err();
    assert!(matches!(err, TeamError::PermissionDenied { .. }));
    assert!(mailer.sent.borrow().is_empty());

    let stranger = Identity::new("x-1", "x@example.com");
    assert!(matches!(
        service.list_pending(&stranger, &team.id),
        Err(TeamError::PermissionDenied { .. })
    ));
}

#[test]
fn malformed_email_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);

    let err = service
        .invite(&admin(), &team.id, "not-an-email", None, &RecordingMailer::default())
        .unwrap_err();
    assert!(matches!(err, TeamError::Validation(_)));
}

#[test]
fn revoked_invitation_cannot_be_accepted() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed);
    let invitation = invite_bob(&service, &team);

    service.revoke(&admin(), &invitation.id).unwrap();
    let err = service.accept(&invitation, Some(&bob())).unwrap_err();
    assert!(matches!(err, TeamError::NotFound { .. }));
    assert_eq!(member_count(&conn, &feed, &team.id), 1);
}

#[test]
fn deep_link_from_email_accepts_the_invitation() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let service = invitations(&conn, &feed).with_link_base("maisonplus-dev://invitation");
    let mailer = RecordingMailer::default();
    service
        .invite(&admin(), &team.id, "bob+home@example.com", None, &mailer)
        .unwrap();

    let link = mailer.sent.borrow()[0].link.clone();
    assert!(link.starts_with("maisonplus-dev://invitation?email=bob%2Bhome%40example.com&id="));

    let reference = InvitationRef::from_link(&link).unwrap();
    assert_eq!(reference.email, "bob+home@example.com");
    let bob_home = Identity::new("bob-1", "bob+home@example.com");
    let outcome = service.accept_ref(&reference, Some(&bob_home)).unwrap();
    assert_eq!(outcome.membership.team_id, team.id);
}

#[test]
fn configured_link_base_and_fallback_name_reach_the_email() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let team = create_team(&conn, &feed, Pack::Family);
    let config = CoreConfig::new()
        .with_invitation_link_base("https://maisonplus.example/invitation")
        .with_invitee_fallback_first_name("voisin");
    let service = invitations(&conn, &feed).with_config(&config);
    let mailer = RecordingMailer::default();

    let outcome = service
        .invite(&admin(), &team.id, "bob@example.com", None, &mailer)
        .unwrap();

    let sent = mailer.sent.borrow();
    assert_eq!(sent[0].recipient_first_name, "voisin");
    assert_eq!(
        sent[0].link,
        format!(
            "https://maisonplus.example/invitation?email=bob%40example.com&id={}",
            outcome.invitation.id
        )
    );
}

#[test]
fn unknown_invitation_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let feed = ChangeFeed::new();
    let service = invitations(&conn, &feed);

    let reference = InvitationRef::new("bob@example.com", "missing");
    assert!(matches!(
        service.accept_ref(&reference, Some(&bob())),
        Err(TeamError::NotFound { .. })
    ));
}
