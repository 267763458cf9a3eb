//! SQLite 持久化：连接池、建表以及用户与文章的查询。

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 对外返回的用户资料（不含密码哈希）。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for PublicUser {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            bio: user.bio,
            avatar: user.avatar,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewBlog {
    pub title: String,
    pub content: String,
    pub cover_image: Option<String>,
    pub author_id: String,
}

#[derive(Default)]
pub struct BlogChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
}

const BLOG_SELECT: &str = "SELECT b.id, b.title, b.content, b.cover_image, b.author_id, \
     u.name AS author_name, b.created_at, b.updated_at \
     FROM blogs b JOIN users u ON u.id = b.author_id";

impl Database {
    /// 打开连接池并确保表结构存在。
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        info!("database connected");
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                bio TEXT,
                avatar TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blogs (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                cover_image TEXT,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS blogs_created_at ON blogs (created_at DESC)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_user(&self, user: NewUser) -> Result<UserRecord, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, bio, avatar, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.bio)
        .bind(&user.avatar)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.find_user(&id).await
    }

    pub async fn find_user(&self, id: &str) -> Result<UserRecord, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// 仅更新提供的字段。
    pub async fn update_user(
        &self,
        id: &str,
        changes: UserChanges,
    ) -> Result<UserRecord, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET name = COALESCE(?, name), bio = COALESCE(?, bio), \
             avatar = COALESCE(?, avatar), updated_at = ? WHERE id = ?",
        )
        .bind(&changes.name)
        .bind(&changes.bio)
        .bind(&changes.avatar)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        self.find_user(id).await
    }

    pub async fn list_blogs(&self) -> Result<Vec<BlogRecord>, sqlx::Error> {
        sqlx::query_as::<_, BlogRecord>(&format!("{BLOG_SELECT} ORDER BY b.created_at DESC"))
            .fetch_all(&self.pool)
            .await
    }

    pub async fn find_blog(&self, id: &str) -> Result<Option<BlogRecord>, sqlx::Error> {
        sqlx::query_as::<_, BlogRecord>(&format!("{BLOG_SELECT} WHERE b.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn insert_blog(&self, blog: NewBlog) -> Result<BlogRecord, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO blogs (id, title, content, cover_image, author_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(&blog.cover_image)
        .bind(&blog.author_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.find_blog(&id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update_blog(
        &self,
        id: &str,
        changes: BlogChanges,
    ) -> Result<BlogRecord, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE blogs SET title = COALESCE(?, title), content = COALESCE(?, content), \
             cover_image = COALESCE(?, cover_image), updated_at = ? WHERE id = ?",
        )
        .bind(&changes.title)
        .bind(&changes.content)
        .bind(&changes.cover_image)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        self.find_blog(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete_blog(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM blogs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
