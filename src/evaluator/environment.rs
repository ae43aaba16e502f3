use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Value;
use crate::builtinops::Arity;
use crate::{Error, MAX_ENV_DEPTH};

struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    outer: Option<Environment>,
    depth: usize,
}

/// Handle to one frame of the environment chain.
///
/// Cloning the handle shares the frame. A frame stays alive as long as some
/// handle (a caller, an inner frame, the REPL) still refers to it.
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// Create an empty root frame (depth 0)
    pub fn root() -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::new(HashMap::new()),
            outer: None,
            depth: 0,
        }))
    }

    /// Create a frame binding each parameter name to the argument at the same
    /// position, chained under `outer`.
    ///
    /// Fails with an arity error when the counts differ and with
    /// [`Error::StackLimit`] when the new frame would be [`MAX_ENV_DEPTH`]
    /// deep. No frame is built in either case.
    pub fn new(
        params: &[String],
        args: Vec<Value>,
        outer: Option<&Environment>,
    ) -> Result<Self, Error> {
        if params.len() != args.len() {
            return Err(Error::arity_error(Arity::Exact(params.len()), args.len()));
        }

        let depth = outer.map_or(0, |env| env.depth() + 1);
        if depth >= MAX_ENV_DEPTH {
            log::warn!("refusing to open frame at depth {depth}");
            return Err(Error::StackLimit { depth });
        }

        let bindings = params.iter().cloned().zip(args).collect();

        Ok(Environment(Rc::new(Frame {
            bindings: RefCell::new(bindings),
            outer: outer.cloned(),
            depth,
        })))
    }

    /// Number of frames above this one
    pub fn depth(&self) -> usize {
        self.0.depth
    }

    pub fn outer(&self) -> Option<&Environment> {
        self.0.outer.as_ref()
    }

    /// Innermost frame, starting here and walking outward, whose own bindings
    /// contain `key`
    pub fn find(&self, key: &str) -> Option<&Environment> {
        let mut frame = self;
        loop {
            if frame.0.bindings.borrow().contains_key(key) {
                return Some(frame);
            }
            frame = frame.outer()?;
        }
    }

    /// Look `key` up through the chain
    pub fn get(&self, key: &str) -> Result<Value, Error> {
        self.find(key)
            .and_then(|frame| frame.0.bindings.borrow().get(key).cloned())
            .ok_or_else(|| Error::UnboundSymbol(key.to_owned()))
    }

    /// Bind `key` in this frame only, overwriting a binding already in this
    /// frame. Outer frames are never written.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(key.into(), value);
    }

    /// True if this frame itself (not an outer one) binds `key`
    #[cfg(test)]
    fn binds_locally(&self, key: &str) -> bool {
        self.0.bindings.borrow().contains_key(key)
    }

    /// True if both handles refer to the same frame
    #[cfg(test)]
    fn same_frame(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// All bindings visible from this frame, inner bindings shadowing outer
    /// ones, sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();
        let mut frame = Some(self);

        while let Some(env) = frame {
            for (name, value) in env.0.bindings.borrow().iter() {
                bindings
                    .entry(name.clone())
                    .or_insert_with(|| value.clone());
            }
            frame = env.outer();
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("depth", &self.depth())
            .field("bindings", &names)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_set_then_get_visible_from_children() {
        let root = Environment::root();
        root.set("x", val(1));
        let child = Environment::new(&[], vec![], Some(&root)).unwrap();
        let grandchild = Environment::new(&[], vec![], Some(&child)).unwrap();

        assert_eq!(root.get("x").unwrap(), val(1));
        assert_eq!(child.get("x").unwrap(), val(1));
        assert_eq!(grandchild.get("x").unwrap(), val(1));
        assert!(grandchild.find("x").unwrap().same_frame(&root));
    }

    #[test]
    fn test_shadowing_stays_in_subtree() {
        let root = Environment::root();
        root.set("x", val(1));
        let child = Environment::new(&[], vec![], Some(&root)).unwrap();
        let grandchild = Environment::new(&[], vec![], Some(&child)).unwrap();
        let sibling = Environment::new(&[], vec![], Some(&root)).unwrap();

        child.set("x", val(2));

        assert_eq!(root.get("x").unwrap(), val(1));
        assert_eq!(child.get("x").unwrap(), val(2));
        assert_eq!(grandchild.get("x").unwrap(), val(2));
        assert_eq!(sibling.get("x").unwrap(), val(1));
        assert!(!root.binds_locally("y"));
    }

    #[test]
    fn test_set_overwrites_same_frame_only() {
        let root = Environment::root();
        root.set("x", val(1));
        let child = Environment::new(&names(&["x"]), vec![val(5)], Some(&root)).unwrap();

        child.set("x", val(6));
        root.set("x", val(2));

        assert_eq!(child.get("x").unwrap(), val(6));
        assert_eq!(root.get("x").unwrap(), val(2));
    }

    #[test]
    fn test_get_missing_names_the_key() {
        let root = Environment::root();
        let child = Environment::new(&[], vec![], Some(&root)).unwrap();
        assert!(child.find("nope").is_none());
        assert_eq!(
            child.get("nope").unwrap_err(),
            Error::UnboundSymbol("nope".to_owned())
        );
    }

    #[test]
    fn test_new_binds_positionally() {
        let env = Environment::new(&names(&["a", "b"]), vec![val(1), sym("two")], None).unwrap();
        assert_eq!(env.depth(), 0);
        assert_eq!(env.get("a").unwrap(), val(1));
        assert_eq!(env.get("b").unwrap(), sym("two"));
    }

    #[test]
    fn test_new_arity_mismatch_builds_nothing() {
        let root = Environment::root();
        let cases = vec![
            (names(&["a"]), vec![]),
            (names(&[]), vec![val(1)]),
            (names(&["a", "b"]), vec![val(1), val(2), val(3)]),
        ];

        for (params, args) in cases {
            let got = args.len();
            match Environment::new(&params, args, Some(&root)) {
                Err(Error::Arity { expected, got: g, .. }) => {
                    assert_eq!(expected, Arity::Exact(params.len()));
                    assert_eq!(g, got);
                }
                other => panic!("expected arity error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_depth_ceiling() {
        // The root plus 999 nested frames make a chain of 1000 frames
        let mut env = Environment::root();
        for expected_depth in 1..MAX_ENV_DEPTH {
            env = Environment::new(&[], vec![], Some(&env)).unwrap();
            assert_eq!(env.depth(), expected_depth);
        }

        assert_eq!(
            Environment::new(&[], vec![], Some(&env)).unwrap_err(),
            Error::StackLimit {
                depth: MAX_ENV_DEPTH
            }
        );
    }

    #[test]
    fn test_get_all_bindings_prefers_inner() {
        let root = Environment::root();
        root.set("a", val(1));
        root.set("b", val(2));
        let child = Environment::new(&names(&["b"]), vec![val(20)], Some(&root)).unwrap();

        assert_eq!(
            child.get_all_bindings(),
            vec![("a".to_owned(), val(1)), ("b".to_owned(), val(20))]
        );
    }
}
