//! Demo object graph served by the `objrpc-server` binary.

use anyhow::{bail, Context};
use objrpc::{dict, CallArgs, ExposedObject, Method, NdArray, RemoteObject, Signature, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A counter shared by every client, reached as `child` or through `get_child`.
pub fn counter() -> Arc<dyn RemoteObject> {
    let count = Arc::new(AtomicI64::new(0));
    let read = count.clone();

    Arc::new(
        ExposedObject::new("Counter")
            .with_doc("Shared counter")
            .getter("value", move || Value::from(read.load(Ordering::SeqCst)))
            .method(
                Method::new("increment", move |args| {
                    let step = match args.get(0, "step") {
                        Some(v) => v.as_i64().context("step must be an integer")?,
                        None => 1,
                    };
                    Ok(Value::from(count.fetch_add(step, Ordering::SeqCst) + step))
                })
                .with_doc("Add `step` to the counter and return the new value")
                .with_signature(Signature::new().param_with_default("step", 1)),
            ),
    )
}

fn add(args: CallArgs) -> anyhow::Result<Value> {
    let a = args.require(0, "a")?;
    let b = args.require(1, "b")?;
    match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => Ok(Value::from(a.checked_add(b).context("integer overflow")?)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::from(a + b)),
            _ => bail!(
                "unsupported operand types for +: '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ),
        },
    }
}

/// Root object of the demo server.
pub fn demo_root() -> Arc<dyn RemoteObject> {
    let child = counter();
    let handed_out = child.clone();

    Arc::new(
        ExposedObject::new("Demo")
            .with_doc("Demo object exposed by objrpc-server")
            .value("constant_value", 5)
            .object("child", child)
            .method(Method::new("fun", |_| Ok(Value::from(10))).with_doc("Doc string 1"))
            .method(
                Method::new("dict_function", |_| Ok(dict! { "a" => 5, "b" => 10 }))
                    .with_doc("Doc string 2"),
            )
            .method(
                Method::new("add", add)
                    .with_doc("Return a + b")
                    .with_signature(Signature::new().param("a").param("b")),
            )
            .method(
                Method::new("echo", |args| Ok(args.require(0, "value")?.clone()))
                    .with_doc("Return the argument unchanged")
                    .with_signature(Signature::new().param("value")),
            )
            .method(
                Method::new("get_child", move |_| Ok(Value::Object(handed_out.clone())))
                    .with_doc("Return the shared counter by reference"),
            )
            .method(
                Method::new("make_counter", |_| Ok(Value::Object(counter())))
                    .with_doc("Return a fresh counter nobody keeps alive"),
            )
            .method(
                Method::new("array", |_| {
                    let values: Vec<u8> = (0..18).collect();
                    Ok(Value::from(NdArray::from_vec(vec![3, 3, 2], values)?))
                })
                .with_doc("Return a 3x3x2 uint8 array"),
            )
            .method(
                Method::new("fail", |_| {
                    Err(anyhow::anyhow!("sensor disconnected")).context("could not read stage position")
                })
                .with_doc("Always fails"),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use objrpc::{EndpointPath, Resolver};

    fn call(resolver: &Resolver, path: &str, args: CallArgs) -> Value {
        resolver
            .call(&EndpointPath::parse(path).unwrap(), args)
            .unwrap()
    }

    #[test]
    fn test_demo_members() {
        let resolver = Resolver::new(demo_root());
        let get = |p: &str| resolver.resolve(&EndpointPath::parse(p).unwrap()).unwrap();

        assert_eq!(get("/constant_value"), Value::Int(5));
        assert_eq!(get("/fun/__doc__"), Value::from("Doc string 1"));
        assert_eq!(call(&resolver, "/fun", CallArgs::new()), Value::Int(10));
        assert_eq!(
            call(&resolver, "/dict_function", CallArgs::new()),
            dict! { "a" => 5, "b" => 10 }
        );
    }

    #[test]
    fn test_add() {
        let resolver = Resolver::new(demo_root());
        assert_eq!(call(&resolver, "/add", CallArgs::new().arg(1).arg(2)), Value::Int(3));
        assert_eq!(
            call(&resolver, "/add", CallArgs::new().arg(1.5).arg(2)),
            Value::Float(3.5)
        );
        assert!(add(CallArgs::new().arg("a").arg(1)).is_err());
        assert!(add(CallArgs::new().arg(i64::MAX).arg(1)).is_err());
    }

    #[test]
    fn test_counter_is_shared() {
        let resolver = Resolver::new(demo_root());
        assert_eq!(call(&resolver, "/child/increment", CallArgs::new()), Value::Int(1));
        assert_eq!(
            call(&resolver, "/child/increment", CallArgs::new().kwarg("step", 4)),
            Value::Int(5)
        );

        let by_ref = call(&resolver, "/get_child", CallArgs::new());
        let child = resolver
            .resolve(&EndpointPath::parse("/child").unwrap())
            .unwrap();
        assert_eq!(by_ref, child);
    }
}
