//! # Secret Expression Evaluator
//!
//! A secret's stored value is interpreted as a small sandboxed expression whose
//! variables are the other live secrets, keyed by name. The language has no I/O
//! and no access to the host; it knows strings, numbers, booleans and `nil`,
//! the usual arithmetic, comparison and logical operators, a ternary and a
//! handful of string built-ins.
//!
//! Variables hold the raw stored values of the referenced secrets. They are not
//! evaluated in turn, so reference cycles between secrets cannot recurse.

mod interpreter;
mod lexer;
mod parser;
mod value;

pub use interpreter::Interpreter;
pub use parser::Expr;
pub use value::Value;

use crate::domain::Secret;
use crate::errors::{KeystashError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Longest expression accepted, in characters
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest nesting of parentheses, ternaries and unary operators
pub const MAX_DEPTH: usize = 64;

/// Source of the live secrets an expression may reference
#[async_trait]
pub trait SecretsLookup: Send + Sync {
    /// All secrets that are not soft-deleted
    async fn live_secrets(&self) -> Result<Vec<Secret>>;
}

#[async_trait]
impl SecretsLookup for Vec<Secret> {
    async fn live_secrets(&self) -> Result<Vec<Secret>> {
        Ok(self.iter().filter(|s| s.deleted_at.is_none()).cloned().collect())
    }
}

/// Parse an expression without evaluating it
pub fn compile(expression: &str) -> Result<Expr> {
    let length = expression.chars().count();
    if length > MAX_EXPRESSION_LEN {
        return Err(KeystashError::evaluation(format!(
            "expression is {} characters long, the limit is {}",
            length, MAX_EXPRESSION_LEN
        )));
    }
    let tokens = lexer::tokenize(expression)?;
    parser::parse(&tokens, MAX_DEPTH)
}

/// Evaluate an expression with the given variables
pub fn evaluate(expression: &str, vars: &HashMap<String, Value>) -> Result<Value> {
    let expr = compile(expression)?;
    Interpreter::new(vars).eval(&expr)
}

/// Variable scope for `secret`: every other live secret by name.
///
/// When two live secrets share a name (under different paths) the one with the
/// lowest ID wins.
pub fn scope_for(secret: &Secret, peers: Vec<Secret>) -> HashMap<String, Value> {
    let mut peers: Vec<Secret> =
        peers.into_iter().filter(|s| s.id != secret.id && s.deleted_at.is_none()).collect();
    peers.sort_by_key(|s| s.id);

    let mut vars = HashMap::with_capacity(peers.len());
    for peer in peers {
        vars.entry(peer.name).or_insert(Value::Str(peer.value));
    }
    vars
}

/// Resolve a secret's value to a string.
///
/// A value made of a single number (optionally negated) or boolean literal
/// resolves to its own text, so plain values like `1`, `-1` or `true` need no
/// quoting. Any other expression
/// must produce a string.
#[instrument(skip(secret, lookup), fields(secret_id = secret.id, secret_name = %secret.name))]
pub async fn evaluate_secret<L>(secret: &Secret, lookup: &L) -> Result<String>
where
    L: SecretsLookup + ?Sized,
{
    let peers = lookup.live_secrets().await?;
    let vars = scope_for(secret, peers);

    let expr = compile(&secret.value)?;
    if expr.is_scalar_literal() {
        return Ok(secret.value.trim().to_string());
    }

    let result = Interpreter::new(&vars).eval(&expr)?;
    debug!(variables = vars.len(), result_type = result.type_name(), "Evaluated secret");

    match result {
        Value::Str(s) => Ok(s),
        other => Err(KeystashError::evaluation(format!(
            "secret '{}' evaluated to a {}, expected a string",
            secret.name,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn secret(id: i64, name: &str, value: &str) -> Secret {
        Secret { id, uid: format!("uid-{}", id), ..Secret::new(1, name, value, "string") }
    }

    #[tokio::test]
    async fn test_reference_resolves_raw_value() {
        let secrets = vec![secret(1, "A", "1"), secret(2, "B", "A")];

        assert_eq!(evaluate_secret(&secrets[1], &secrets).await.unwrap(), "1");
        assert_eq!(evaluate_secret(&secrets[0], &secrets).await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_numeric_result_is_rejected() {
        let secrets = vec![secret(1, "SUM", "1 + 2")];
        let err = evaluate_secret(&secrets[0], &secrets).await.unwrap_err();
        assert!(matches!(err, KeystashError::Evaluation { .. }));
    }

    #[tokio::test]
    async fn test_self_is_excluded_from_scope() {
        let secrets = vec![secret(1, "LOOP", "LOOP")];
        let err = evaluate_secret(&secrets[0], &secrets).await.unwrap_err();
        assert!(err.to_string().contains("unknown identifier 'LOOP'"));
    }

    #[tokio::test]
    async fn test_cycles_do_not_recurse() {
        let secrets = vec![secret(1, "A", "B"), secret(2, "B", "A")];
        assert_eq!(evaluate_secret(&secrets[0], &secrets).await.unwrap(), "A");
        assert_eq!(evaluate_secret(&secrets[1], &secrets).await.unwrap(), "B");
    }

    #[tokio::test]
    async fn test_deleted_secrets_are_invisible() {
        let mut gone = secret(1, "OLD", "'x'");
        gone.deleted_at = Some(Utc::now());
        let secrets = vec![gone, secret(2, "NEW", "OLD")];
        assert!(evaluate_secret(&secrets[1], &secrets).await.is_err());
    }

    #[tokio::test]
    async fn test_string_literals_and_builtins() {
        let secrets = vec![
            secret(1, "HOST", "db.internal"),
            secret(2, "URL", "'postgres://' + HOST + ':' + 5432"),
            secret(3, "NAME", "upper(\"app\")"),
            secret(4, "FLAG", " true "),
            secret(5, "OFFSET", "-1"),
        ];
        assert_eq!(
            evaluate_secret(&secrets[1], &secrets).await.unwrap(),
            "postgres://db.internal:5432"
        );
        assert_eq!(evaluate_secret(&secrets[2], &secrets).await.unwrap(), "APP");
        assert_eq!(evaluate_secret(&secrets[3], &secrets).await.unwrap(), "true");
        assert_eq!(evaluate_secret(&secrets[4], &secrets).await.unwrap(), "-1");
    }

    #[test]
    fn test_scope_prefers_lowest_id_on_duplicate_names() {
        let target = secret(9, "T", "X");
        let scope = scope_for(&target, vec![secret(5, "X", "later"), secret(2, "X", "first")]);
        assert_eq!(scope.get("X"), Some(&Value::from("first")));
    }

    #[test]
    fn test_length_limit() {
        let long = format!("'{}'", "a".repeat(MAX_EXPRESSION_LEN));
        assert!(compile(&long).is_err());
        assert!(evaluate("'ok'", &HashMap::new()).is_ok());
    }

    struct FailingLookup;

    #[async_trait]
    impl SecretsLookup for FailingLookup {
        async fn live_secrets(&self) -> Result<Vec<Secret>> {
            Err(KeystashError::internal("lookup unavailable"))
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let err = evaluate_secret(&secret(1, "A", "'x'"), &FailingLookup).await.unwrap_err();
        assert!(matches!(err, KeystashError::Internal { .. }));
    }
}
