use crate::cache::CacheService;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::info;

pub const MOVIES_PREFIX: &str = "movies:";

/// Ключ кеша для набора фильтров списка фильмов.
pub fn movies_key<F: Serialize>(filters: &F) -> Result<String, serde_urlencoded::ser::Error> {
    Ok(format!("{}{}", MOVIES_PREFIX, serde_urlencoded::to_string(filters)?))
}

impl CacheService {
    /// Получает закешированный список фильмов по ключу.
    pub async fn get_cached_movies(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(key).await
    }

    /// Сохраняет список фильмов в кеш на `ttl_seconds`.
    pub async fn cache_movies(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(key, value, self.ttl_seconds).await
    }

    /// Сбрасывает все списки фильмов (после изменения каталога).
    pub async fn invalidate_movies(&self) -> Result<usize, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", MOVIES_PREFIX))
            .query_async(&mut conn)
            .await?;

        if !keys.is_empty() {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.del(key);
            }
            let _: () = pipe.query_async(&mut conn).await?;
            info!("Invalidated {} cached movie listings", keys.len());
        }
        Ok(keys.len())
    }
}
