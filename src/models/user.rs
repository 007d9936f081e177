use super::UserId;

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub nickname: String,
    /// Salted SHA-256 digest, never the plain password.
    pub password_hash: String,
    pub salt: String,
}

#[derive(Debug)]
pub struct CreateUser {
    pub username: String,
    pub password: String,
    pub nickname: String,
}
