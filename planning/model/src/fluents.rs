use itertools::Itertools;
use thiserror::Error;

use crate::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FluentError {
    #[error("duplicate fluent `{0}`")]
    DuplicateFluent(Sym),
    #[error("unknown fluent `{0}`")]
    UnknownFluent(Sym),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FluentId(u32);

#[derive(Clone, Debug, Default)]
pub struct Fluents {
    fluents: Vec<Fluent>,
}

impl Fluents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: impl Into<Sym>) -> Result<FluentId, FluentError> {
        let name = name.into();
        self.fluents
            .iter()
            .position(|f| f.name == name)
            .map(|i| FluentId(i as u32))
            .ok_or(FluentError::UnknownFluent(name))
    }

    pub fn fluent(&self, id: FluentId) -> &Fluent {
        &self.fluents[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (FluentId, &Fluent)> + '_ {
        self.fluents.iter().enumerate().map(|(i, f)| (FluentId(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.fluents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fluents.is_empty()
    }

    pub fn add_fluent(
        &mut self,
        name: impl Into<Sym>,
        parameters: Vec<Param>,
        return_type: Type,
        default: Option<ExprId>,
    ) -> Result<FluentId, FluentError> {
        let fluent = Fluent {
            name: name.into(),
            parameters,
            return_type,
            default,
        };
        if self.fluents.iter().any(|f| f.name() == fluent.name()) {
            Err(FluentError::DuplicateFluent(fluent.name))
        } else {
            self.fluents.push(fluent);
            Ok(FluentId(self.fluents.len() as u32 - 1))
        }
    }
}

impl Display for Env<'_, &Fluents> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fluents:")?;
        for (_, fluent) in self.elem.iter() {
            write!(f, "\n  {}", self.env / fluent)?;
        }
        Ok(())
    }
}

/// A named, typed and parameterized state variable.
#[derive(Clone, Debug)]
pub struct Fluent {
    pub name: Sym,
    pub parameters: Vec<Param>,
    pub return_type: Type,
    /// Value of all groundings of the fluent that are not explicitly initialized.
    pub default: Option<ExprId>,
}

impl Fluent {
    pub fn name(&self) -> &Sym {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    pub fn return_type(&self, args: &[ExprId], env: &Environment) -> Result<Type, TypeError> {
        if args.len() < self.parameters.len() {
            return Err(TypeError::MissingParameter(self.parameters[args.len()].name.clone()));
        } else if args.len() > self.parameters.len() {
            return Err(TypeError::UnexpectedArgument((env / args[self.parameters.len()]).to_string()));
        }
        for (i, arg) in args.iter().enumerate() {
            self.parameters[i].tpe.accepts(*arg, env)?;
        }
        Ok(self.return_type.clone())
    }
}

impl Display for Env<'_, &Fluent> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) -> {}",
            self.elem.name,
            self.elem.parameters.iter().map(|p| self.env / p).format(", "),
            self.env / &self.elem.return_type
        )?;
        if let Some(default) = self.elem.default {
            write!(f, " = {}", self.env / default)?;
        }
        Ok(())
    }
}
