//! Formula recalculation over a dataset.
//!
//! Formulas are evaluated strictly in declaration order. Each one sees the
//! imported variables plus every result produced earlier in the same pass, so
//! later formulas may build on earlier ones. There is no cycle detection
//! beyond that single left-to-right pass.
//!
//! Identifiers are assigned once per pass: a variable keeps the same
//! `var_<k>` for the whole pass, and results stored mid-pass get fresh ones.
//!
//! A failing formula never aborts the pass: its error is recorded in the
//! [`EvaluationReport`], any previous value stored under its result name is
//! left untouched, and evaluation continues with the next definition.

use thiserror::Error;

use crate::expression::{self, Evaluated, Namespace};
use crate::formula::FormulaDefinition;
use crate::normalize::{denormalize, is_reserved_name, NameNormalizer, NormalizeError};
use crate::store::{Dataset, StoreError, Variable};

/// Errors raised for a single formula
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// The result name is already used by an imported variable
    #[error("Result name '{0}' collides with an imported variable")]
    NameCollision(String),

    /// The result name has the shape of a generated or internal identifier
    #[error("Result name '{0}' is reserved for generated identifiers")]
    ReservedName(String),

    /// Variable names could not be mapped to identifiers
    #[error(transparent)]
    Naming(#[from] NormalizeError),

    /// The expression failed to evaluate; `message` uses display names
    #[error("Failed to evaluate '{expression}': {message}")]
    Evaluation { expression: String, message: String },

    /// The result could not be stored
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to one formula during a pass
#[derive(Clone, Debug, PartialEq)]
pub enum FormulaOutcome {
    /// Stored with this many samples
    Success { len: usize },
    /// Evaluation failed; the previous value (if any) is unchanged
    Failure { message: String },
    /// Rejected before evaluation (name collision or reserved name)
    Rejected { message: String },
    /// The definition is disabled
    Skipped,
}

impl FormulaOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FormulaOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            FormulaOutcome::Failure { .. } | FormulaOutcome::Rejected { .. }
        )
    }

    /// Error message for failed or rejected formulas
    pub fn message(&self) -> Option<&str> {
        match self {
            FormulaOutcome::Failure { message } | FormulaOutcome::Rejected { message } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Per-formula outcomes of one evaluation pass, in declaration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationReport {
    entries: Vec<(String, FormulaOutcome)>,
}

impl EvaluationReport {
    fn push(&mut self, result_name: &str, outcome: FormulaOutcome) {
        self.entries.push((result_name.to_string(), outcome));
    }

    /// (result name, outcome) pairs in declaration order
    pub fn entries(&self) -> &[(String, FormulaOutcome)] {
        &self.entries
    }

    /// Outcome for a result name (the last one if the name was declared twice)
    pub fn get(&self, result_name: &str) -> Option<&FormulaOutcome> {
        self.entries
            .iter()
            .rev()
            .find(|(name, _)| name == result_name)
            .map(|(_, outcome)| outcome)
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|(_, o)| o.is_failure()).count()
    }

    /// Failed and rejected formulas with their messages
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(name, o)| o.message().map(|m| (name.as_str(), m)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One-line summary for status messages
    pub fn summary(&self) -> String {
        if self.failure_count() == 0 {
            format!("Updated {} channels.", self.success_count())
        } else {
            format!(
                "Updated {} channels, {} failed.",
                self.success_count(),
                self.failure_count()
            )
        }
    }
}

/// Reject result names that would shadow an imported variable or a
/// generated identifier
pub fn check_collision(dataset: &Dataset, definition: &FormulaDefinition) -> Result<(), FormulaError> {
    if is_reserved_name(&definition.result_name) {
        return Err(FormulaError::ReservedName(definition.result_name.clone()));
    }
    if dataset.is_imported(&definition.result_name) {
        return Err(FormulaError::NameCollision(definition.result_name.clone()));
    }
    Ok(())
}

/// Build the evaluator namespace for the current contents of `dataset`
fn build_namespace<'a>(
    dataset: &'a Dataset,
    normalizer: &NameNormalizer,
) -> Namespace<'a> {
    let mut namespace = Namespace::new();
    for variable in dataset.variables() {
        if let Some(identifier) = normalizer.identifier(&variable.name) {
            namespace.bind(identifier, &variable.values);
        }
    }
    for (alias, display) in normalizer.aliases() {
        if let Some(variable) = dataset.get(&display) {
            namespace.bind(alias, &variable.values);
        }
    }
    namespace
}

/// Evaluate one definition against the dataset without storing the result.
///
/// Scalars are broadcast to the dataset length; series of any other length
/// are an error.
pub fn evaluate_definition(
    dataset: &Dataset,
    definition: &FormulaDefinition,
) -> Result<Vec<f64>, FormulaError> {
    check_collision(dataset, definition)?;
    let normalizer = NameNormalizer::new(dataset.names())?;
    evaluate_with(dataset, definition, &normalizer)
}

/// Evaluate with identifiers already assigned by `normalizer`
fn evaluate_with(
    dataset: &Dataset,
    definition: &FormulaDefinition,
    normalizer: &NameNormalizer,
) -> Result<Vec<f64>, FormulaError> {
    let (safe, mapping) = normalizer.normalize(&definition.expression);
    let namespace = build_namespace(dataset, normalizer);

    let failure = |message: String| FormulaError::Evaluation {
        expression: definition.expression.clone(),
        message: denormalize(&message, &mapping),
    };

    match expression::evaluate(&safe, &namespace) {
        Ok(Evaluated::Scalar(value)) => Ok(vec![value; dataset.len()]),
        Ok(Evaluated::Series(values)) if values.len() == dataset.len() => Ok(values),
        Ok(Evaluated::Series(values)) => Err(failure(format!(
            "result has {} values but the dataset has {}",
            values.len(),
            dataset.len()
        ))),
        Err(e) => Err(failure(e.to_string())),
    }
}

/// Dry-run a definition: collision, naming and syntax checks only
pub fn validate_definition(
    dataset: &Dataset,
    definition: &FormulaDefinition,
) -> Result<(), FormulaError> {
    check_collision(dataset, definition)?;

    let normalizer = NameNormalizer::new(dataset.names())?;
    let (safe, mapping) = normalizer.normalize(&definition.expression);

    let aliases = normalizer.aliases();
    let identifiers: Vec<&str> = normalizer
        .bindings()
        .map(|(_, ident)| ident)
        .chain(aliases.iter().map(|(alias, _)| alias.as_str()))
        .collect();

    expression::validate(&safe, &identifiers).map_err(|e| FormulaError::Evaluation {
        expression: definition.expression.clone(),
        message: denormalize(&e.to_string(), &mapping),
    })
}

/// First `count` values a definition would produce
pub fn preview(
    dataset: &Dataset,
    definition: &FormulaDefinition,
    count: usize,
) -> Result<Vec<f64>, FormulaError> {
    let values = evaluate_definition(dataset, definition)?;
    Ok(values.into_iter().take(count).collect())
}

/// Evaluate every enabled definition in order and store the results.
///
/// The dataset is only mutated for definitions that evaluate successfully.
pub fn evaluate_all(dataset: &mut Dataset, definitions: &[FormulaDefinition]) -> EvaluationReport {
    let mut report = EvaluationReport::default();
    let mut normalizer = NameNormalizer::new(dataset.names());

    for definition in definitions {
        let name = definition.result_name.as_str();
        if !definition.enabled {
            report.push(name, FormulaOutcome::Skipped);
            continue;
        }

        let result = check_collision(dataset, definition).and_then(|()| match &mut normalizer {
            Ok(normalizer) => {
                let values = evaluate_with(dataset, definition, normalizer)?;
                normalizer.register(name)?;
                let len = values.len();
                dataset.insert(Variable::derived(name, definition.unit.as_str(), values))?;
                Ok(len)
            }
            Err(e) => Err(FormulaError::Naming(e.clone())),
        });

        let outcome = match result {
            Ok(len) => FormulaOutcome::Success { len },
            Err(e @ (FormulaError::NameCollision(_) | FormulaError::ReservedName(_))) => {
                tracing::warn!("Rejected formula '{}': {}", name, e);
                FormulaOutcome::Rejected {
                    message: e.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("Error calculating '{}': {}", name, e);
                FormulaOutcome::Failure {
                    message: e.to_string(),
                }
            }
        };
        report.push(name, outcome);
    }

    tracing::info!(
        "Calculated {} of {} formulas for {}",
        report.success_count(),
        definitions.len(),
        dataset.name
    );
    report
}
