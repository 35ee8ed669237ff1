//! A persistent singly-linked stack.
//!
//! [`Chain`] models the operand stack during stack elimination. Pushing returns a new chain
//! that shares its tail with the old one, so a snapshot taken before a divergent path is
//! never affected by what that path pushes or pops.

use std::rc::Rc;

#[derive(Debug)]
struct Link<T> {
    head: T,
    tail: Chain<T>,
}

/// An immutable stack. `push` is O(1); there is no in-place mutation.
#[derive(Debug)]
pub struct Chain<T> {
    link: Option<Rc<Link<T>>>,
    len: usize,
}

impl<T> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Chain {
            link: self.link.clone(),
            len: self.len,
        }
    }
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Chain<T> {
    /// The empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Chain { link: None, len: 0 }
    }

    /// Returns a chain with `value` on top of `self`.
    #[must_use]
    pub fn push(&self, value: T) -> Self {
        Chain {
            link: Some(Rc::new(Link {
                head: value,
                tail: self.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// The top element.
    #[must_use]
    pub fn head(&self) -> Option<&T> {
        self.link.as_ref().map(|link| &link.head)
    }

    /// Everything below the top element; the empty chain stays empty.
    #[must_use]
    pub fn tail(&self) -> Self {
        match &self.link {
            Some(link) => link.tail.clone(),
            None => Chain::new(),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for the empty chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.link.is_none()
    }

    /// The element `depth` positions below the top.
    #[must_use]
    pub fn get(&self, depth: usize) -> Option<&T> {
        self.iter().nth(depth)
    }

    /// Iterates from the top down.
    pub fn iter(&self) -> ChainIter<'_, T> {
        ChainIter {
            next: self.link.as_deref(),
        }
    }
}

/// Top-down iterator over a [`Chain`].
pub struct ChainIter<'a, T> {
    next: Option<&'a Link<T>>,
}

impl<'a, T> Iterator for ChainIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.next?;
        self.next = link.tail.link.as_deref();
        Some(&link.head)
    }
}

impl<'a, T> IntoIterator for &'a Chain<T> {
    type Item = &'a T;
    type IntoIter = ChainIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Drop for Chain<T> {
    // Unwinds iteratively so long chains do not recurse on drop.
    fn drop(&mut self) {
        let mut link = self.link.take();
        while let Some(rc) = link {
            match Rc::try_unwrap(rc) {
                Ok(mut inner) => link = inner.tail.link.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_is_persistent() {
        let empty: Chain<i32> = Chain::new();
        let one = empty.push(1);
        let two = one.push(2);
        let other = one.push(3);

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.iter().copied().collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(other.iter().copied().collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(two.tail().head(), Some(&1));
    }

    #[test]
    fn test_get_by_depth() {
        let chain = Chain::new().push('a').push('b').push('c');
        assert_eq!(chain.get(0), Some(&'c'));
        assert_eq!(chain.get(2), Some(&'a'));
        assert_eq!(chain.get(3), None);
    }

    #[test]
    fn test_tail_of_empty() {
        let chain: Chain<u8> = Chain::new();
        assert!(chain.tail().is_empty());
        assert_eq!(chain.head(), None);
    }

    #[test]
    fn test_long_chain_drops() {
        let mut chain = Chain::new();
        for i in 0..200_000 {
            chain = chain.push(i);
        }
        assert_eq!(chain.len(), 200_000);
        drop(chain);
    }
}
