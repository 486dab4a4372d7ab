//! Кеш ответов со списками фильмов.
//!
//! Redis здесь только ускоряет чтение каталога. Любая ошибка кеша
//! логируется вызывающей стороной и не ломает запрос. Места и билеты
//! в кеш не попадают никогда: их источник правды - леджер.

use crate::redis_client::RedisClient;

pub mod movies;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    pub fn redis(&self) -> &RedisClient {
        &self.redis
    }
}
