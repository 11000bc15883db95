use thiserror::Error;

use crate::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

#[derive(Clone, Debug)]
pub struct Object {
    name: Sym,
    tpe: UserTypeId,
}

impl Object {
    pub fn name(&self) -> &Sym {
        &self.name
    }

    pub fn tpe(&self) -> UserTypeId {
        self.tpe
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    #[error("duplicate object `{0}` with incompatible types")]
    DuplicateObjectDeclaration(Sym),
    #[error("unknown object `{0}`")]
    UnknownObject(Sym),
}

/// Objects of the problem, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Objects {
    objects: Vec<Object>,
    by_name: hashbrown::HashMap<Sym, ObjectId>,
}

impl Objects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, name: impl Into<Sym>, tpe: UserTypeId) -> Result<ObjectId, ObjectError> {
        let name = name.into();
        if let Some(&previous) = self.by_name.get(&name) {
            if self.object(previous).tpe == tpe {
                // objects are exactly the same, ignore as some domains contain such patterns
                Ok(previous)
            } else {
                Err(ObjectError::DuplicateObjectDeclaration(name))
            }
        } else {
            let id = ObjectId(self.objects.len() as u32);
            self.objects.push(Object { name: name.clone(), tpe });
            self.by_name.insert(name, id);
            Ok(id)
        }
    }

    pub fn get(&self, name: impl Into<Sym>) -> Result<ObjectId, ObjectError> {
        let name = name.into();
        match self.by_name.get(&name) {
            Some(&id) => Ok(id),
            None => Err(ObjectError::UnknownObject(name)),
        }
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> + '_ {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i as u32), o))
    }

    /// All objects whose type is `tpe` or one of its subtypes, in declaration order.
    pub fn of_type<'a>(&'a self, tpe: UserTypeId, types: &'a Types) -> impl Iterator<Item = ObjectId> + 'a {
        self.iter()
            .filter(move |(_, o)| types.is_subtype_of(o.tpe, tpe))
            .map(|(id, _)| id)
    }
}

impl Display for Env<'_, &Objects> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Objects:")?;
        for (_, o) in self.elem.iter() {
            write!(f, "\n  {}: {}", o.name, self.env.types.name(o.tpe))?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_by_type() -> anyhow::Result<()> {
        let mut types = Types::new();
        let loc = types.add_type("location", None)?;
        let room = types.add_type("room", Some(loc))?;
        let robot = types.add_type("robot", None)?;
        let mut objects = Objects::new();
        let l1 = objects.add_object("l1", loc)?;
        let r1 = objects.add_object("r1", robot)?;
        let k = objects.add_object("kitchen", room)?;

        assert_eq!(objects.of_type(loc, &types).collect::<Vec<_>>(), vec![l1, k]);
        assert_eq!(objects.of_type(room, &types).collect::<Vec<_>>(), vec![k]);
        assert_eq!(objects.of_type(robot, &types).collect::<Vec<_>>(), vec![r1]);

        // redeclaration with the same type is tolerated
        assert_eq!(objects.add_object("l1", loc)?, l1);
        assert!(objects.add_object("l1", robot).is_err());
        assert_eq!(objects.get("kitchen")?, k);
        assert!(objects.get("garden").is_err());
        Ok(())
    }
}
