//! Payload shapes of the three packet actions.
//!
//! GET:  `[def_id, member, [args...]]`
//! SET:  `[def_id, member, data]`
//! TASK: `[{"task": name, "args": [...]}, ...]`, answered with
//!       `{name: {"result": ...} | {"error": ...}}`.

use std::collections::BTreeMap;

use netron_core::{DefId, NetronError, NetronResult, RemoteError, Value};

use crate::peer::TaskRequest;

pub(crate) fn encode_get(def_id: DefId, member: &str, args: Vec<Value>) -> Value {
    Value::Seq(vec![
        Value::Int(def_id.0 as i64),
        Value::Str(member.to_string()),
        Value::Seq(args),
    ])
}

pub(crate) fn decode_get(data: Value) -> NetronResult<(DefId, String, Vec<Value>)> {
    let (def_id, member, tail) = split_target(data, "get")?;
    Ok((def_id, member, tail.into_args()))
}

pub(crate) fn encode_set(def_id: DefId, member: &str, data: Value) -> Value {
    Value::Seq(vec![
        Value::Int(def_id.0 as i64),
        Value::Str(member.to_string()),
        data,
    ])
}

pub(crate) fn decode_set(data: Value) -> NetronResult<(DefId, String, Value)> {
    split_target(data, "set")
}

fn split_target(data: Value, action: &str) -> NetronResult<(DefId, String, Value)> {
    let items = match data {
        Value::Seq(items) if items.len() == 3 => items,
        other => {
            return Err(NetronError::InvalidPacket(format!(
                "malformed {action} payload: {other:?}"
            )))
        }
    };
    let mut items = items.into_iter();
    let def_id = items
        .next()
        .and_then(|v| v.as_int())
        .filter(|n| *n >= 0 && *n <= u32::MAX as i64)
        .map(|n| DefId(n as u32))
        .ok_or_else(|| NetronError::InvalidPacket(format!("bad definition id in {action}")))?;
    let member = match items.next() {
        Some(Value::Str(s)) => s,
        _ => {
            return Err(NetronError::InvalidPacket(format!(
                "bad member name in {action}"
            )))
        }
    };
    let tail = match items.next() {
        Some(v) => v,
        None => Value::Null,
    };
    Ok((def_id, member, tail))
}

pub(crate) fn encode_task(requests: &[TaskRequest]) -> Value {
    Value::Seq(
        requests
            .iter()
            .map(|req| {
                let mut map = BTreeMap::new();
                map.insert("task".to_string(), Value::Str(req.name.clone()));
                map.insert("args".to_string(), Value::Seq(req.args.clone()));
                Value::Map(map)
            })
            .collect(),
    )
}

pub(crate) fn decode_task(data: Value) -> NetronResult<Vec<TaskRequest>> {
    let items = match data {
        Value::Seq(items) => items,
        other => {
            return Err(NetronError::InvalidPacket(format!(
                "malformed task payload: {other:?}"
            )))
        }
    };
    items
        .into_iter()
        .map(|item| {
            let mut map = match item {
                Value::Map(map) => map,
                other => {
                    return Err(NetronError::InvalidPacket(format!(
                        "malformed task request: {other:?}"
                    )))
                }
            };
            let name = match map.remove("task") {
                Some(Value::Str(s)) => s,
                _ => {
                    return Err(NetronError::InvalidPacket(
                        "task request without a name".into(),
                    ))
                }
            };
            let args = map.remove("args").unwrap_or(Value::Null).into_args();
            Ok(TaskRequest { name, args })
        })
        .collect()
}

pub(crate) fn task_result_entry(outcome: NetronResult<Value>) -> Value {
    let mut map = BTreeMap::new();
    match outcome {
        Ok(value) => {
            map.insert("result".to_string(), value);
        }
        Err(err) => {
            map.insert("error".to_string(), Value::Error(RemoteError::from(&err)));
        }
    }
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_roundtrip() {
        let data = encode_get(DefId(3), "greet", vec![Value::from("world")]);
        let (def_id, member, args) = decode_get(data).unwrap();
        assert_eq!(def_id, DefId(3));
        assert_eq!(member, "greet");
        assert_eq!(args, vec![Value::from("world")]);
    }

    #[test]
    fn test_set_roundtrip() {
        let data = encode_set(DefId(9), "count", Value::from(5));
        let (def_id, member, value) = decode_set(data).unwrap();
        assert_eq!(def_id, DefId(9));
        assert_eq!(member, "count");
        assert_eq!(value, Value::from(5));
    }

    #[test]
    fn test_task_roundtrip() {
        let reqs = vec![
            TaskRequest::new("a"),
            TaskRequest::with_args("b", vec![Value::from(1)]),
        ];
        let decoded = decode_task(encode_task(&reqs)).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].name, "a");
        assert!(decoded[0].args.is_empty());
        assert_eq!(decoded[1].args, vec![Value::from(1)]);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(decode_get(Value::Null).is_err());
        assert!(decode_task(Value::Map(Default::default())).is_err());
    }
}
