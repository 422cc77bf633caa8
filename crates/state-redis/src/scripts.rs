//! Lua scripts giving the Redis backend the atomicity §5 requires
//! ("Shared resource policy": circuit breaker state, token buckets, and
//! lease sets "must be mutated atomically (server-side scripting or
//! compare-and-swap)").

/// `KEYS[1]` = string key, `KEYS[2]` = hash key, `ARGV[1]` = value,
/// `ARGV[2]` = TTL in ms (0 = no TTL). Sets `KEYS[1]` only if neither the
/// string key nor the hash key already holds a value. Returns 1 if newly
/// set, 0 otherwise.
pub const CHECK_AND_SET: &str = r"
local exists = redis.call('EXISTS', KEYS[1])
local hexists = redis.call('HEXISTS', KEYS[2], 'v')
if exists == 1 or hexists == 1 then
  return 0
end
redis.call('SET', KEYS[1], ARGV[1])
if tonumber(ARGV[2]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 1
";

/// `KEYS[1]` = hash key, `ARGV[1]` = expected version, `ARGV[2]` = new
/// value, `ARGV[3]` = TTL in ms. Returns `{1, new_version}` on success or
/// `{0, current_version, current_value}` on conflict. Version 0 means "key
/// does not yet exist".
pub const COMPARE_AND_SWAP: &str = r"
local cur_ver = tonumber(redis.call('HGET', KEYS[1], 'ver') or '0')
local cur_val = redis.call('HGET', KEYS[1], 'v')
if cur_ver ~= tonumber(ARGV[1]) then
  return {0, cur_ver, cur_val}
end
local new_ver = cur_ver + 1
redis.call('HSET', KEYS[1], 'v', ARGV[2], 'ver', new_ver)
if tonumber(ARGV[3]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[3])
end
return {1, new_ver}
";

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token, `ARGV[2]` = TTL ms.
/// `SET NX PX` equivalent. Returns 1 if acquired, 0 otherwise.
pub const LOCK_ACQUIRE: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
  return 1
end
return 0
";

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token, `ARGV[2]` = new TTL ms.
/// Returns 1 if the lock was still held by `owner` and extended, 0 if not.
pub const LOCK_EXTEND: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
return 0
";

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token. Returns 1 if the lock was
/// held by `owner` and deleted, 0 if not (already expired or stolen).
pub const LOCK_RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('DEL', KEYS[1])
  return 1
end
return 0
";

/// `KEYS[1]` = sorted set key, `ARGV[1]` = lease id, `ARGV[2]` = now ms,
/// `ARGV[3]` = expiry ms, `ARGV[4]` = max cardinality.
///
/// Evicts members scored below `now`, then admits `ARGV[1]` iff the
/// post-eviction cardinality is below `max` (§4.4). Returns
/// `{1}` on acquisition, or `{0, current_count, oldest_expiry_or_nil}` on
/// denial.
pub const LEASE_ACQUIRE: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[2])
local count = redis.call('ZCARD', KEYS[1])
if count < tonumber(ARGV[4]) then
  redis.call('ZADD', KEYS[1], ARGV[3], ARGV[1])
  return {1}
end
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
if oldest[2] then
  return {0, count, oldest[2]}
end
return {0, count}
";

/// `KEYS[1]` = sorted set key, `ARGV[1]` = now ms. Evicts stale members and
/// returns the resulting cardinality.
pub const LEASE_COUNT: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
return redis.call('ZCARD', KEYS[1])
";
