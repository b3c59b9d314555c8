use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use colloquy_api::{
    ArticleId, AuthToken, Comment, CommentId, Db, Error, Like, NewComment, Time, User, UserId,
};

/// In-memory stand-in for the real server: same operations, same error
/// semantics, no Postgres. Tests drive this instead of a live database.
pub struct MockServer {
    users: BTreeMap<UserId, User>,
    sessions: HashMap<AuthToken, UserId>,
    comments: BTreeMap<CommentId, Comment>,
    likes: BTreeMap<(CommentId, UserId), Time>,
    next_user_id: i64,
    next_comment_id: i64,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            comments: BTreeMap::new(),
            likes: BTreeMap::new(),
            next_user_id: 1,
            next_comment_id: 1,
        }
    }

    /// Registration lives outside the server proper; tests provision users
    /// directly.
    pub fn add_user(&mut self, username: &str) -> UserId {
        self.add_user_with_flags(username, false)
    }

    pub fn add_superuser(&mut self, username: &str) -> UserId {
        self.add_user_with_flags(username, true)
    }

    fn add_user_with_flags(&mut self, username: &str, is_superuser: bool) -> UserId {
        let id = UserId(self.next_user_id);
        self.next_user_id += 1;
        self.users.insert(
            id,
            User {
                id,
                username: String::from(username),
                is_premium: false,
                premium_end_at: None,
                is_superuser,
            },
        );
        id
    }

    /// Drops a user record while leaving their comments in place, as happens
    /// when the account service deletes an account.
    pub fn remove_user(&mut self, user: UserId) {
        self.users.remove(&user);
    }

    /// Token issuance also lives outside the server proper.
    pub fn open_session(&mut self, user: UserId) -> AuthToken {
        let token = AuthToken(Uuid::new_v4());
        self.sessions.insert(token, user);
        token
    }

    pub fn recover_session(&self, token: AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(&token)
            .copied()
            .ok_or(Error::PermissionDenied)
    }

    pub fn create_comment(&mut self, author: UserId, data: &NewComment) -> Result<Comment, Error> {
        data.validate()?;
        let comment = Comment {
            id: CommentId(self.next_comment_id),
            article_id: data.article_id.clone(),
            content: data.content.clone(),
            user_id: author,
            parent_id: data.parent_id,
            created_at: Utc::now(),
        };
        self.next_comment_id += 1;
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    pub fn delete_comment(&mut self, requester: UserId, comment: CommentId) -> Result<(), Error> {
        let target = self
            .comments
            .get(&comment)
            .ok_or(Error::CommentNotFound(comment))?;
        if target.user_id != requester
            && !self
                .users
                .get(&requester)
                .map_or(false, |u| u.is_superuser)
        {
            return Err(Error::PermissionDenied);
        }

        // Walk the reply tree; likes on deleted comments go with them.
        let mut doomed = vec![comment];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i];
            let children = self
                .comments
                .values()
                .filter(|c| c.parent_id == Some(parent))
                .map(|c| c.id)
                .collect::<Vec<_>>();
            for child in children {
                if !doomed.contains(&child) {
                    doomed.push(child);
                }
            }
            i += 1;
        }
        for id in &doomed {
            self.comments.remove(id);
            self.likes.retain(|(c, _), _| c != id);
        }
        Ok(())
    }

    pub fn create_like(&mut self, comment: CommentId, user: UserId) -> Result<Like, Error> {
        if !self.comments.contains_key(&comment) {
            return Err(Error::CommentNotFound(comment));
        }
        if self.likes.contains_key(&(comment, user)) {
            return Err(Error::AlreadyLiked(comment, user));
        }
        let created_at = Utc::now();
        self.likes.insert((comment, user), created_at);
        Ok(Like {
            comment_id: comment,
            user_id: user,
            created_at,
        })
    }

    pub fn delete_like(&mut self, comment: CommentId, user: UserId) -> Result<(), Error> {
        match self.likes.remove(&(comment, user)) {
            Some(_) => Ok(()),
            None => Err(Error::LikeNotFound(comment, user)),
        }
    }
}

#[async_trait]
impl Db for MockServer {
    async fn fetch_comments_by_article(
        &mut self,
        article: &ArticleId,
    ) -> anyhow::Result<Vec<Comment>> {
        let mut comments = self
            .comments
            .values()
            .filter(|c| &c.article_id == article)
            .cloned()
            .collect::<Vec<_>>();
        comments.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(comments)
    }

    async fn fetch_like_counts(
        &mut self,
        comments: &[CommentId],
    ) -> anyhow::Result<HashMap<CommentId, i64>> {
        let mut counts = HashMap::new();
        for &(comment, _) in self.likes.keys() {
            if comments.contains(&comment) {
                *counts.entry(comment).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn fetch_liked_comment_ids(
        &mut self,
        user: UserId,
        comments: &[CommentId],
    ) -> anyhow::Result<HashSet<CommentId>> {
        Ok(self
            .likes
            .keys()
            .filter(|(c, u)| *u == user && comments.contains(c))
            .map(|(c, _)| *c)
            .collect())
    }

    async fn resolve_username(&mut self, user: UserId) -> anyhow::Result<Option<String>> {
        Ok(self.users.get(&user).map(|u| u.username.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_api::build_comment_tree;

    fn article(s: &str) -> ArticleId {
        ArticleId(String::from(s))
    }

    fn new_comment(article_id: &ArticleId, content: &str, parent: Option<CommentId>) -> NewComment {
        NewComment {
            article_id: article_id.clone(),
            content: String::from(content),
            parent_id: parent,
        }
    }

    #[test]
    fn sessions_recover_to_their_user() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let token = server.open_session(ada);
        assert_eq!(server.recover_session(token), Ok(ada));
        assert_eq!(
            server.recover_session(AuthToken::stub()),
            Err(Error::PermissionDenied)
        );
    }

    #[test]
    fn empty_comment_content_is_rejected() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        assert_eq!(
            server.create_comment(ada, &new_comment(&art, "", None)),
            Err(Error::EmptyContent)
        );
        assert_eq!(
            server.create_comment(ada, &new_comment(&art, "a\0b", None)),
            Err(Error::NullByteInString(String::from("a\0b")))
        );
    }

    #[test]
    fn duplicate_like_conflicts_and_keeps_the_original() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        let c = server
            .create_comment(ada, &new_comment(&art, "hello", None))
            .unwrap();

        let like = server.create_like(c.id, ada).unwrap();
        assert_eq!(
            server.create_like(c.id, ada),
            Err(Error::AlreadyLiked(c.id, ada))
        );
        assert_eq!(server.likes.get(&(c.id, ada)), Some(&like.created_at));
    }

    #[test]
    fn like_lifecycle_not_found_cases() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        let c = server
            .create_comment(ada, &new_comment(&art, "hello", None))
            .unwrap();

        assert_eq!(
            server.create_like(CommentId(99), ada),
            Err(Error::CommentNotFound(CommentId(99)))
        );
        assert_eq!(
            server.delete_like(c.id, ada),
            Err(Error::LikeNotFound(c.id, ada))
        );
        server.create_like(c.id, ada).unwrap();
        assert_eq!(server.delete_like(c.id, ada), Ok(()));
        assert_eq!(
            server.delete_like(c.id, ada),
            Err(Error::LikeNotFound(c.id, ada))
        );
    }

    #[tokio::test]
    async fn deleting_a_comment_cascades_to_descendants() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        let root = server
            .create_comment(ada, &new_comment(&art, "root", None))
            .unwrap();
        let reply = server
            .create_comment(ada, &new_comment(&art, "reply", Some(root.id)))
            .unwrap();
        let nested = server
            .create_comment(ada, &new_comment(&art, "nested", Some(reply.id)))
            .unwrap();
        let other = server
            .create_comment(ada, &new_comment(&art, "other", None))
            .unwrap();
        server.create_like(nested.id, ada).unwrap();

        server.delete_comment(ada, root.id).unwrap();

        let remaining = server.fetch_comments_by_article(&art).await.unwrap();
        assert_eq!(
            remaining.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![other.id]
        );
        assert!(server.likes.is_empty());
    }

    #[test]
    fn deletion_is_for_the_author_or_a_superuser() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let eve = server.add_user("eve");
        let root_admin = server.add_superuser("root");
        let art = article("a");
        let c = server
            .create_comment(ada, &new_comment(&art, "hello", None))
            .unwrap();

        assert_eq!(
            server.delete_comment(eve, c.id),
            Err(Error::PermissionDenied)
        );
        assert_eq!(server.delete_comment(root_admin, c.id), Ok(()));
        assert_eq!(
            server.delete_comment(ada, c.id),
            Err(Error::CommentNotFound(c.id))
        );
    }

    #[tokio::test]
    async fn tree_merges_likes_usernames_and_reply_order() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let eve = server.add_user("eve");
        let art = article("a");

        let c1 = server
            .create_comment(ada, &new_comment(&art, "first", None))
            .unwrap();
        let c2 = server
            .create_comment(eve, &new_comment(&art, "reply", Some(c1.id)))
            .unwrap();
        let c3 = server
            .create_comment(eve, &new_comment(&art, "second", None))
            .unwrap();
        // A comment on another article never shows up.
        server
            .create_comment(ada, &new_comment(&article("b"), "elsewhere", None))
            .unwrap();

        server.create_like(c1.id, ada).unwrap();
        server.create_like(c1.id, eve).unwrap();

        let tree = build_comment_tree(&mut server, &art, Some(ada)).await.unwrap();
        assert_eq!(
            tree.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![c3.id, c1.id]
        );
        assert_eq!(tree[0].username, Some(String::from("eve")));
        assert_eq!(tree[0].like_count, 0);
        assert!(!tree[0].liked);
        assert_eq!(tree[1].like_count, 2);
        assert!(tree[1].liked);
        assert_eq!(
            tree[1].replies.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![c2.id]
        );

        // Anonymous request: aggregate count stays, liked is uniformly false.
        let tree = build_comment_tree(&mut server, &art, None).await.unwrap();
        assert_eq!(tree[1].like_count, 2);
        assert!(!tree[1].liked);

        // A user who liked nothing sees the same counts, unliked.
        let tree = build_comment_tree(&mut server, &art, Some(eve)).await.unwrap();
        assert_eq!(tree[1].like_count, 2);
        assert!(!tree[1].liked);
    }

    #[tokio::test]
    async fn removed_author_resolves_to_null_username() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        server
            .create_comment(ada, &new_comment(&art, "hello", None))
            .unwrap();
        server.remove_user(ada);

        let tree = build_comment_tree(&mut server, &art, None).await.unwrap();
        assert_eq!(tree[0].username, None);
    }

    #[tokio::test]
    async fn dangling_parent_is_creatable_but_never_served() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        server
            .create_comment(ada, &new_comment(&art, "root", None))
            .unwrap();
        let orphan = server
            .create_comment(ada, &new_comment(&art, "orphan", Some(CommentId(999))))
            .unwrap();
        assert!(server.comments.contains_key(&orphan.id));

        let tree = build_comment_tree(&mut server, &art, None).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert!(tree[0].replies.is_empty());
    }

    #[tokio::test]
    async fn unchanged_data_rebuilds_an_identical_tree() {
        let mut server = MockServer::new();
        let ada = server.add_user("ada");
        let art = article("a");
        let c1 = server
            .create_comment(ada, &new_comment(&art, "root", None))
            .unwrap();
        server
            .create_comment(ada, &new_comment(&art, "reply", Some(c1.id)))
            .unwrap();
        server.create_like(c1.id, ada).unwrap();

        let first = build_comment_tree(&mut server, &art, Some(ada)).await.unwrap();
        let second = build_comment_tree(&mut server, &art, Some(ada)).await.unwrap();
        assert_eq!(first, second);
    }

    struct FailingDb;

    #[async_trait]
    impl Db for FailingDb {
        async fn fetch_comments_by_article(
            &mut self,
            _article: &ArticleId,
        ) -> anyhow::Result<Vec<Comment>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn fetch_like_counts(
            &mut self,
            _comments: &[CommentId],
        ) -> anyhow::Result<HashMap<CommentId, i64>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn fetch_liked_comment_ids(
            &mut self,
            _user: UserId,
            _comments: &[CommentId],
        ) -> anyhow::Result<HashSet<CommentId>> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn resolve_username(&mut self, _user: UserId) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn store_failure_propagates_with_no_partial_tree() {
        let res = build_comment_tree(&mut FailingDb, &article("a"), None).await;
        assert!(res.is_err());
    }
}
