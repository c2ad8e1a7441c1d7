// Built-in API surface of an embedded page
//
// A flat namespace of fully qualified member paths. Documents and injected
// scripts reach built-ins only through PageScope::call, which is exactly the
// boundary the interception table wraps.

use crate::recorder::{ApiFunction, InstallError, Interceptable, Thrown};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
struct Member {
    function: ApiFunction,
    configurable: bool,
}

/// Namespace of built-in members keyed by dotted path
#[derive(Clone, Default)]
pub struct ApiSurface {
    members: BTreeMap<String, Member>,
}

fn this_str<'v>(this: &'v Value, member: &str) -> Result<&'v str, Thrown> {
    this.as_str()
        .ok_or_else(|| Thrown::type_error(format!("{member} called on non-string receiver")))
}

fn arg_str<'v>(args: &'v [Value], index: usize) -> &'v str {
    args.get(index).and_then(Value::as_str).unwrap_or("undefined")
}

impl ApiSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-ins every embedded page starts with
    pub fn standard() -> Self {
        let mut surface = ApiSurface::new();

        surface.define(
            "globalThis.String.prototype.includes",
            ApiFunction::native(|this, args| {
                let text = this_str(this, "includes")?;
                Ok(json!(text.contains(arg_str(args, 0))))
            }),
        );
        surface.define(
            "globalThis.String.prototype.toUpperCase",
            ApiFunction::native(|this, _| Ok(json!(this_str(this, "toUpperCase")?.to_uppercase()))),
        );
        surface.define(
            "globalThis.Map.prototype.get",
            ApiFunction::native(|this, args| {
                let key = arg_str(args, 0);
                Ok(this.get(key).cloned().unwrap_or(Value::Null))
            }),
        );
        surface.define(
            "globalThis.JSON.stringify",
            ApiFunction::native(|_, args| {
                let value = args.first().cloned().unwrap_or(Value::Null);
                Ok(json!(value.to_string()))
            }),
        );
        surface.define(
            "globalThis.Math.max",
            ApiFunction::native(|_, args| {
                let max = args
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(f64::NAN))
                    .fold(f64::NEG_INFINITY, f64::max);
                Ok(json!(max))
            }),
        );
        surface.define(
            "globalThis.Math.random",
            ApiFunction::native(|_, _| Ok(json!(rand::random::<f64>()))),
        );
        surface.define(
            "globalThis.Date.now",
            ApiFunction::native(|_, _| {
                let millis = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                Ok(json!(millis))
            }),
        );
        surface.define(
            "globalThis.Document.prototype.getElementById",
            ApiFunction::native(|_, args| {
                Ok(json!({"id": arg_str(args, 0), "tagName": "DIV"}))
            }),
        );
        surface.define(
            "globalThis.Document.prototype.createElement",
            ApiFunction::native(|_, args| {
                Ok(json!({"tagName": arg_str(args, 0).to_uppercase()}))
            }),
        );
        surface.define(
            "globalThis.Element.prototype.setAttribute",
            ApiFunction::native(|_, _| Ok(Value::Null)),
        );
        surface.define(
            "globalThis.Element.prototype.appendChild",
            ApiFunction::native(|_, args| Ok(args.first().cloned().unwrap_or(Value::Null))),
        );
        surface.define_sealed(
            "globalThis.Object.freeze",
            ApiFunction::native(|_, args| Ok(args.first().cloned().unwrap_or(Value::Null))),
        );

        surface
    }

    /// Add or replace a configurable member
    pub fn define(&mut self, path: impl Into<String>, function: ApiFunction) {
        self.members.insert(
            path.into(),
            Member {
                function,
                configurable: true,
            },
        );
    }

    /// Add a member that refuses replacement
    pub fn define_sealed(&mut self, path: impl Into<String>, function: ApiFunction) {
        self.members.insert(
            path.into(),
            Member {
                function,
                configurable: false,
            },
        );
    }

    pub fn member(&self, path: &str) -> Option<ApiFunction> {
        self.members.get(path).map(|m| m.function.clone())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Interceptable for ApiSurface {
    fn paths(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    fn get_original(&self, path: &str) -> Option<ApiFunction> {
        self.member(path)
    }

    fn install(&mut self, path: &str, wrapper: ApiFunction) -> Result<(), InstallError> {
        let member = self
            .members
            .get_mut(path)
            .ok_or_else(|| InstallError::Unknown(path.to_string()))?;
        if !member.configurable {
            return Err(InstallError::NonConfigurable(path.to_string()));
        }
        member.function = wrapper;
        Ok(())
    }
}

/// Shared view of one page's surface
///
/// Cloning shares the surface. Functions installed into the surface that need
/// to call back into it should hold a [`WeakPageScope`] so the page can drop.
#[derive(Clone, Default)]
pub struct PageScope {
    surface: Arc<RwLock<ApiSurface>>,
}

impl PageScope {
    pub fn new(surface: ApiSurface) -> Self {
        PageScope {
            surface: Arc::new(RwLock::new(surface)),
        }
    }

    /// Call the member currently installed at `path`.
    ///
    /// The lock is released before the call so implementations may call
    /// back into the scope.
    pub fn call(&self, path: &str, this: Value, args: &[Value]) -> Result<Value, Thrown> {
        let function = self
            .surface
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .member(path);
        match function {
            Some(function) => function.call(&this, args),
            None => Err(Thrown::type_error(format!("{path} is not a function"))),
        }
    }

    pub fn define(&self, path: impl Into<String>, function: ApiFunction) {
        self.surface
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .define(path, function);
    }

    pub fn downgrade(&self) -> WeakPageScope {
        WeakPageScope {
            surface: Arc::downgrade(&self.surface),
        }
    }
}

impl Interceptable for PageScope {
    fn paths(&self) -> Vec<String> {
        self.surface
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .paths()
    }

    fn get_original(&self, path: &str) -> Option<ApiFunction> {
        self.surface
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get_original(path)
    }

    fn install(&mut self, path: &str, wrapper: ApiFunction) -> Result<(), InstallError> {
        self.surface
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .install(path, wrapper)
    }
}

/// Non-owning scope handle for functions stored inside the surface
#[derive(Clone)]
pub struct WeakPageScope {
    surface: Weak<RwLock<ApiSurface>>,
}

impl WeakPageScope {
    pub fn call(&self, path: &str, this: Value, args: &[Value]) -> Result<Value, Thrown> {
        match self.surface.upgrade() {
            Some(surface) => PageScope { surface }.call(path, this, args),
            None => Err(Thrown::type_error("page has been closed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_builtins() {
        let scope = PageScope::new(ApiSurface::standard());
        assert_eq!(
            scope.call("globalThis.String.prototype.includes", json!("version"), &[json!("ver")]),
            Ok(json!(true))
        );
        assert_eq!(
            scope.call(
                "globalThis.Document.prototype.getElementById",
                Value::Null,
                &[json!("htmlvar00001")],
            ),
            Ok(json!({"id": "htmlvar00001", "tagName": "DIV"}))
        );
        assert_eq!(
            scope.call("globalThis.Map.prototype.get", json!({"k": 7}), &[json!("k")]),
            Ok(json!(7))
        );
    }

    #[test]
    fn test_wrong_receiver_throws_type_error() {
        let scope = PageScope::new(ApiSurface::standard());
        let err = scope
            .call("globalThis.String.prototype.includes", json!(5), &[json!("a")])
            .unwrap_err();
        assert_eq!(err.0["name"], "TypeError");
    }

    #[test]
    fn test_unknown_member_is_not_a_function() {
        let scope = PageScope::new(ApiSurface::new());
        assert!(scope.call("globalThis.fetch", Value::Null, &[]).is_err());
    }

    #[test]
    fn test_sealed_member_refuses_install() {
        let mut surface = ApiSurface::standard();
        let noop = ApiFunction::native(|_, _| Ok(Value::Null));
        assert_eq!(
            surface.install("globalThis.Object.freeze", noop.clone()),
            Err(InstallError::NonConfigurable("globalThis.Object.freeze".into()))
        );
        assert_eq!(
            surface.install("globalThis.nope", noop),
            Err(InstallError::Unknown("globalThis.nope".into()))
        );
    }

    #[test]
    fn test_weak_scope_after_drop() {
        let scope = PageScope::new(ApiSurface::standard());
        let weak = scope.downgrade();
        assert!(weak.call("globalThis.Math.max", Value::Null, &[json!(1)]).is_ok());
        drop(scope);
        assert!(weak.call("globalThis.Math.max", Value::Null, &[json!(1)]).is_err());
    }
}
