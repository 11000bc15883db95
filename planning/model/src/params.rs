use crate::{env::Env, *};

/// A typed name, used both for the parameters of actions and fluents and for quantified
/// variables.
///
/// Two parameters with the same name and type are the same parameter: expressions referring to
/// them are shared in the environment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: Sym,
    pub tpe: Type,
}

impl Param {
    pub fn new(name: impl Into<Sym>, tpe: Type) -> Self {
        Param { name: name.into(), tpe }
    }

    pub fn name(&self) -> &Sym {
        &self.name
    }

    pub fn tpe(&self) -> &Type {
        &self.tpe
    }
}

impl Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.name, self.tpe)
    }
}

/// `name: type`
impl Display for Env<'_, &Param> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.elem.name, self.env / &self.elem.tpe)
    }
}
