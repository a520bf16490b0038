use simplesocial_common::{
    model::{
        Id,
        auth::{AuthToken, Authentication, HashedPassword},
        group::{
            CreateGroup, Group, GroupName, GroupRef, JoinOutcome, LeaveOutcome, UpdateGroup,
        },
        post::{PostFields, PostMessage},
        user::{Account, CreateUser, EmailAddress, Permissions, UserHandle},
    },
    slug::Slug,
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use simplesocial_db::client::{DbClient, DbError, UniqueViolation};
use time::{Duration, UtcDateTime};

async fn client() -> DbClient {
    DbClient::connect(
        "sqlite::memory:",
        1,
        WorkerId::new(1).unwrap(),
        ProcessId::new(1).unwrap(),
    )
    .await
    .unwrap()
}

async fn user(client: &DbClient, handle: &str) -> Account {
    client
        .create_user(&CreateUser {
            handle: UserHandle::new(handle.to_owned()).unwrap(),
            email: EmailAddress::new(format!("{handle}@example.com")).unwrap(),
            password: HashedPassword::from_phc("not-a-real-hash".to_owned()),
            permissions: Permissions::default(),
        })
        .await
        .unwrap()
}

async fn group(client: &DbClient, name: &str) -> Group {
    let fields = CreateGroup {
        name: GroupName::new(name.to_owned()).unwrap(),
        description: String::new(),
    }
    .into_fields()
    .unwrap();

    client.create_group(&fields).await.unwrap()
}

fn post_fields(message: &str) -> PostFields {
    PostFields::derive(PostMessage::new(message.to_owned()).unwrap())
}

fn slug(slug: &str) -> Slug {
    Slug::parse(slug.to_owned()).unwrap()
}

#[tokio::test]
async fn handles_are_unique_regardless_of_case() {
    let client = client().await;
    let alice = user(&client, "alice").await;

    let duplicate = client
        .create_user(&CreateUser {
            handle: UserHandle::new("ALICE".to_owned()).unwrap(),
            email: EmailAddress::new("other@example.com".to_owned()).unwrap(),
            password: HashedPassword::from_phc("not-a-real-hash".to_owned()),
            permissions: Permissions::default(),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(DbError::Conflict(UniqueViolation::UserHandle))
    ));

    let found = client.fetch_user_by_handle("Alice").await.unwrap().unwrap();
    assert_eq!(found, alice.user);
    assert_eq!(
        client.fetch_account(alice.user.id).await.unwrap().unwrap(),
        alice
    );
}

#[tokio::test]
async fn non_ascii_handles_fold_case_too() {
    let client = client().await;
    let zoe = user(&client, "Zoë").await;

    let duplicate = client
        .create_user(&CreateUser {
            handle: UserHandle::new("ZOË".to_owned()).unwrap(),
            email: EmailAddress::new("other@example.com".to_owned()).unwrap(),
            password: HashedPassword::from_phc("not-a-real-hash".to_owned()),
            permissions: Permissions::default(),
        })
        .await;
    assert!(matches!(
        duplicate,
        Err(DbError::Conflict(UniqueViolation::UserHandle))
    ));

    let found = client.fetch_user_by_handle("ZOË").await.unwrap().unwrap();
    assert_eq!(found, zoe.user);
    assert_eq!(found.handle.get(), "Zoë");

    let (found, _) = client.fetch_credentials("zoË").await.unwrap().unwrap();
    assert_eq!(found, zoe.user);
    assert!(client.fetch_user_posts("ZOË").await.unwrap().is_some());
}

#[tokio::test]
async fn credentials_come_back_with_the_stored_hash() {
    let client = client().await;
    let alice = user(&client, "alice").await;

    let (found, hash) = client.fetch_credentials("alice").await.unwrap().unwrap();
    assert_eq!(found, alice.user);
    assert_eq!(hash.as_phc(), "not-a-real-hash");

    assert!(client.fetch_credentials("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn auth_tokens_are_stored_by_hash() {
    let client = client().await;
    let alice = user(&client, "alice").await;

    let token = AuthToken::generate_random(alice.user.id);
    let authentication = Authentication {
        user: alice.user.id,
        token_hash: token.hash().unwrap(),
        created_at: UtcDateTime::now(),
        expires_after: PositiveDuration::new(Duration::hours(2)),
    };
    client.create_auth(&authentication).await.unwrap();

    let fetched = client
        .fetch_auth(&authentication.token_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.user, alice.user.id);
    assert_eq!(fetched.expires_after, authentication.expires_after);

    assert!(client.delete_auth(&authentication.token_hash).await.unwrap());
    assert!(
        client
            .fetch_auth(&authentication.token_hash)
            .await
            .unwrap()
            .is_none()
    );
    assert!(!client.delete_auth(&authentication.token_hash).await.unwrap());
}

#[tokio::test]
async fn group_slugs_follow_names() {
    let client = client().await;
    let book_club = group(&client, "Book Club!").await;
    assert_eq!(book_club.slug.get(), "book-club");

    // Same slug, different name.
    let fields = CreateGroup {
        name: GroupName::new("book club".to_owned()).unwrap(),
        description: String::new(),
    }
    .into_fields()
    .unwrap();
    assert!(matches!(
        client.create_group(&fields).await,
        Err(DbError::Conflict(UniqueViolation::Group))
    ));

    let renamed_fields = UpdateGroup {
        name: Some(GroupName::new("Readers".to_owned()).unwrap()),
        description: Some("We *read*.".to_owned()),
    }
    .apply_to(&book_club)
    .unwrap();
    let renamed = client
        .update_group(book_club.id, &renamed_fields)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(renamed.id, book_club.id);
    assert_eq!(renamed.slug.get(), "readers");
    assert_eq!(renamed.description_html, "<p>We <em>read</em>.</p>\n");
    assert!(client.fetch_group(&slug("book-club")).await.unwrap().is_none());
    assert_eq!(
        client.fetch_group(&slug("readers")).await.unwrap(),
        Some(renamed)
    );
}

#[tokio::test]
async fn joining_twice_is_reported() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let book_club = group(&client, "Book Club").await;

    let joined = client
        .join_group(alice.user.id, &book_club.slug)
        .await
        .unwrap();
    assert!(matches!(
        joined,
        Some(JoinOutcome::Joined(membership)) if membership.group == book_club.id
    ));
    assert_eq!(
        client
            .join_group(alice.user.id, &book_club.slug)
            .await
            .unwrap(),
        Some(JoinOutcome::AlreadyMember)
    );

    assert_eq!(
        client
            .leave_group(alice.user.id, &book_club.slug)
            .await
            .unwrap(),
        Some(LeaveOutcome::Left)
    );
    assert_eq!(
        client
            .leave_group(alice.user.id, &book_club.slug)
            .await
            .unwrap(),
        Some(LeaveOutcome::NotMember)
    );

    assert_eq!(
        client
            .join_group(alice.user.id, &slug("nowhere"))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn simultaneous_joins_make_one_membership() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let book_club = group(&client, "Book Club").await;

    let (first, second) = tokio::join!(
        client.join_group(alice.user.id, &book_club.slug),
        client.join_group(alice.user.id, &book_club.slug),
    );
    let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];

    let joined = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, JoinOutcome::Joined(_)))
        .count();
    assert_eq!(joined, 1);
    assert!(outcomes.contains(&JoinOutcome::AlreadyMember));
    assert_eq!(
        client.fetch_group_members(book_club.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn group_summaries_count_members_and_posts() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let bob = user(&client, "bob").await;
    let gardening = group(&client, "Gardening").await;
    let book_club = group(&client, "Book Club").await;

    for member in [&alice, &bob] {
        client
            .join_group(member.user.id, &book_club.slug)
            .await
            .unwrap();
    }
    client
        .create_post(alice.user.id, &post_fields("First!"), Some(book_club.id))
        .await
        .unwrap();
    client
        .create_post(alice.user.id, &post_fields("Not in a group"), None)
        .await
        .unwrap();

    let summaries = client.fetch_groups().await.unwrap();
    let names: Vec<_> = summaries
        .iter()
        .map(|summary| summary.group.name.get())
        .collect();
    assert_eq!(names, ["Book Club", "Gardening"]);
    assert_eq!(
        (summaries[0].member_count, summaries[0].post_count),
        (2, 1)
    );
    assert_eq!(
        (summaries[1].member_count, summaries[1].post_count),
        (0, 0)
    );
    assert_eq!(summaries[1].group, gardening);

    let detail = client
        .fetch_group_detail(&book_club.slug)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.members, [alice.user.clone(), bob.user]);
    assert_eq!(detail.posts.len(), 1);
    assert_eq!(
        detail.posts[0].group.as_ref().map(|group| &group.slug),
        Some(&book_club.slug)
    );

    assert_eq!(
        client.fetch_user_groups(alice.user.id).await.unwrap(),
        [GroupRef::from(book_club)]
    );
}

#[tokio::test]
async fn posts_are_listed_newest_first() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let bob = user(&client, "bob").await;

    let first = client
        .create_post(alice.user.id, &post_fields("one"), None)
        .await
        .unwrap();
    let second = client
        .create_post(bob.user.id, &post_fields("two"), None)
        .await
        .unwrap();
    let third = client
        .create_post(alice.user.id, &post_fields("three"), None)
        .await
        .unwrap();

    let ids: Vec<_> = client
        .fetch_posts()
        .await
        .unwrap()
        .into_iter()
        .map(|post| post.id)
        .collect();
    assert_eq!(ids, [third.id, second.id, first.id]);

    let alices = client.fetch_user_posts("ALICE").await.unwrap().unwrap();
    assert_eq!(alices.user, alice.user);
    assert_eq!(alices.posts, [third, first.clone()]);

    assert!(client.fetch_user_posts("carol").await.unwrap().is_none());

    assert_eq!(
        client
            .fetch_user_post("alice", first.id)
            .await
            .unwrap(),
        Some(first.clone())
    );
    assert!(
        client
            .fetch_user_post("bob", first.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn a_user_cannot_repeat_a_message() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let bob = user(&client, "bob").await;

    let post = client
        .create_post(alice.user.id, &post_fields("Hello"), None)
        .await
        .unwrap();
    assert_eq!(post.message_html, "<p>Hello</p>\n");
    assert_eq!(post.author, alice.user);

    assert!(matches!(
        client
            .create_post(alice.user.id, &post_fields("Hello"), None)
            .await,
        Err(DbError::Conflict(UniqueViolation::Post))
    ));
    assert!(
        client
            .create_post(bob.user.id, &post_fields("Hello"), None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn only_authors_change_their_posts() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let bob = user(&client, "bob").await;

    let post = client
        .create_post(alice.user.id, &post_fields("draft"), None)
        .await
        .unwrap();

    assert!(
        client
            .update_post(bob.user.id, post.id, &post_fields("hijacked"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(!client.delete_post(bob.user.id, post.id).await.unwrap());

    let updated = client
        .update_post(alice.user.id, post.id, &post_fields("**final**"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, post.id);
    assert_eq!(updated.message.get(), "**final**");
    assert_eq!(updated.message_html, "<p><strong>final</strong></p>\n");
    assert!(updated.created_at >= post.created_at);

    assert!(client.delete_post(alice.user.id, post.id).await.unwrap());
    assert!(client.fetch_post(post.id).await.unwrap().is_none());
    assert!(!client.delete_post(alice.user.id, post.id).await.unwrap());
}

#[tokio::test]
async fn deleting_a_group_takes_its_posts_and_memberships() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let book_club = group(&client, "Book Club").await;

    client
        .join_group(alice.user.id, &book_club.slug)
        .await
        .unwrap();
    let grouped = client
        .create_post(alice.user.id, &post_fields("in the club"), Some(book_club.id))
        .await
        .unwrap();
    let loose = client
        .create_post(alice.user.id, &post_fields("out of the club"), None)
        .await
        .unwrap();

    assert!(client.delete_group(&book_club.slug).await.unwrap());
    assert!(!client.delete_group(&book_club.slug).await.unwrap());

    assert!(client.fetch_post(grouped.id).await.unwrap().is_none());
    assert!(client.fetch_post(loose.id).await.unwrap().is_some());
    assert!(
        client
            .fetch_user_groups(alice.user.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn deleting_a_user_takes_everything_they_own() {
    let client = client().await;
    let alice = user(&client, "alice").await;
    let bob = user(&client, "bob").await;
    let book_club = group(&client, "Book Club").await;

    client
        .join_group(alice.user.id, &book_club.slug)
        .await
        .unwrap();
    let post = client
        .create_post(alice.user.id, &post_fields("bye"), Some(book_club.id))
        .await
        .unwrap();
    let token_hash = AuthToken::generate_random(alice.user.id).hash().unwrap();
    client
        .create_auth(&Authentication {
            user: alice.user.id,
            token_hash: token_hash.clone(),
            created_at: UtcDateTime::now(),
            expires_after: None,
        })
        .await
        .unwrap();

    assert!(client.delete_user(alice.user.id).await.unwrap());

    assert!(client.fetch_user(alice.user.id).await.unwrap().is_none());
    assert!(client.fetch_post(post.id).await.unwrap().is_none());
    assert!(client.fetch_auth(&token_hash).await.unwrap().is_none());
    assert!(
        client
            .fetch_group_members(book_club.id)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(client.fetch_user(bob.user.id).await.unwrap().is_some());
    assert!(!client.delete_user(Id::from(12345)).await.unwrap());
}
