//! Lua bodies of the protocol scripts.

use vhash_script::Script;

/// Bump the version; on creation register the object and announce it.
///
/// KEYS: registry, collection, hash, channel. ARGV: score.
pub const TOUCH: Script = Script::new(
    "touch",
    r#"
local v = redis.call('hincrby', KEYS[3], 'v', 1)
if v == 1 then
    local id = string.sub(KEYS[3], string.len(KEYS[2]) + 2)
    redis.call('sadd', KEYS[1], KEYS[2])
    redis.call('zadd', KEYS[2], ARGV[1], id)
    redis.call('publish', KEYS[4], cjson.encode({[id] = {v = v}}))
end
return v
"#,
);

/// Write every field whose value differs and bump the version once.
///
/// KEYS: registry, collection, hash, channel.
/// ARGV: score, field, value [, field, value ...].
pub const SET: Script = Script::new(
    "set",
    r#"
local changes = {}
local update = {}
local publish = false
for i = 2, #ARGV, 2 do
    local field = ARGV[i]
    local value = ARGV[i + 1]
    local prev = redis.call('hget', KEYS[3], field)
    if prev ~= value then
        redis.call('hset', KEYS[3], field, value)
        table.insert(changes, field)
        table.insert(changes, prev)
        table.insert(changes, value)
        if string.sub(field, 1, 1) ~= '_' then
            update[field] = cjson.decode(value)
            publish = true
        end
    end
end
if #changes == 0 then
    return changes
end
local id = string.sub(KEYS[3], string.len(KEYS[2]) + 2)
local v = redis.call('hincrby', KEYS[3], 'v', 1)
table.insert(changes, 1, tostring(v))
if v == 1 then
    redis.call('zadd', KEYS[2], ARGV[1], id)
    redis.call('sadd', KEYS[1], KEYS[2])
    publish = true
end
if publish then
    update['v'] = v
    redis.call('publish', KEYS[4], cjson.encode({[id] = update}))
end
return changes
"#,
);

/// Delete every named field that exists and bump the version once.
///
/// The notification lists every cleared field, internal ones included.
///
/// KEYS: registry, collection, hash, channel. ARGV: field [, field ...].
pub const CLEAR: Script = Script::new(
    "clear",
    r#"
local cleared = {}
local update = {}
for i = 1, #ARGV do
    local prev = redis.call('hget', KEYS[3], ARGV[i])
    if prev then
        redis.call('hdel', KEYS[3], ARGV[i])
        table.insert(cleared, ARGV[i])
        table.insert(cleared, prev)
        update[ARGV[i]] = cjson.null
    end
end
if #cleared == 0 then
    return cleared
end
local id = string.sub(KEYS[3], string.len(KEYS[2]) + 2)
local v = redis.call('hincrby', KEYS[3], 'v', 1)
table.insert(cleared, 1, tostring(v))
update['v'] = v
redis.call('publish', KEYS[4], cjson.encode({[id] = update}))
return cleared
"#,
);

/// Delete the object; on success drop its membership and publish a
/// tombstone.
///
/// KEYS: registry, collection, hash, channel.
pub const CHECKED_DELETE: Script = Script::new(
    "checked-delete",
    r#"
local removed = redis.call('del', KEYS[3])
if removed == 1 then
    local id = string.sub(KEYS[3], string.len(KEYS[2]) + 2)
    redis.call('zrem', KEYS[2], id)
    redis.call('publish', KEYS[4], cjson.encode({[id] = cjson.null}))
end
return removed
"#,
);

/// Add members to a set only if none of them is already present.
///
/// KEYS: set. ARGV: member [, member ...]. Returns the members already
/// present; an empty reply means the merge happened.
pub const MERGE_INTO_SET_IF_DISTINCT: Script = Script::new(
    "merge-into-set-if-distinct",
    r#"
local present = {}
for i = 1, #ARGV do
    if redis.call('sismember', KEYS[1], ARGV[i]) == 1 then
        table.insert(present, ARGV[i])
    end
end
if #present == 0 and #ARGV > 0 then
    redis.call('sadd', KEYS[1], unpack(ARGV))
end
return present
"#,
);

/// Write a hash field and return its previous value.
///
/// KEYS: hash. ARGV: field, value.
pub const HASH_GET_SET: Script = Script::new(
    "hash-get-set",
    r#"
local old = redis.call('hget', KEYS[1], ARGV[1])
redis.call('hset', KEYS[1], ARGV[1], ARGV[2])
return old
"#,
);

/// Every protocol script, for preloading.
pub const ALL: [Script; 6] = [
    TOUCH,
    SET,
    CLEAR,
    CHECKED_DELETE,
    MERGE_INTO_SET_IF_DISTINCT,
    HASH_GET_SET,
];
