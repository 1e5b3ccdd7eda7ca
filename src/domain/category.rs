//! Category tree nodes and leaf selection.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::CategoryId;

/// A node in the source site's category tree.
///
/// Identity is immutable once created; discovery may update `name` and
/// `slug` but never re-parents a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Store-assigned identifier.
    pub id: CategoryId,
    /// Display name.
    pub name: String,
    /// Parent node, `None` for roots.
    pub parent_id: Option<CategoryId>,
    /// Identifier used by the source site.
    pub external_id: String,
    /// URL slug on the source site.
    pub slug: String,
}

/// A category as produced by discovery, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    /// Display name.
    pub name: String,
    /// Parent node, `None` for roots.
    pub parent_id: Option<CategoryId>,
    /// Identifier used by the source site. Upserts are keyed on this.
    pub external_id: String,
    /// URL slug on the source site.
    pub slug: String,
}

/// Returns the leaves of `nodes`: nodes that never appear as a parent.
///
/// Order follows the input order.
#[must_use]
pub fn leaves(nodes: &[CategoryNode]) -> Vec<CategoryNode> {
    let parents: HashSet<CategoryId> = nodes.iter().filter_map(|n| n.parent_id).collect();
    nodes
        .iter()
        .filter(|n| !parents.contains(&n.id))
        .cloned()
        .collect()
}

/// A root category of the seed tree with its children.
#[derive(Debug, Clone, Copy)]
pub struct SeedCategory {
    /// Display name.
    pub name: &'static str,
    /// Source-site identifier.
    pub external_id: &'static str,
    /// URL slug.
    pub slug: &'static str,
    /// Child categories as `(name, external_id, slug)`.
    pub children: &'static [(&'static str, &'static str, &'static str)],
}

/// Category tree used to bootstrap an empty store in standalone mode.
pub const SEED_TREE: &[SeedCategory] = &[
    SeedCategory {
        name: "Electronics",
        external_id: "1001",
        slug: "electronics",
        children: &[
            ("Smartphones", "2001", "electronics/smartphones"),
            ("Laptops", "2002", "electronics/laptops"),
        ],
    },
    SeedCategory {
        name: "Clothing",
        external_id: "1002",
        slug: "clothing",
        children: &[
            ("Men's Clothing", "2003", "clothing/mens"),
            ("Women's Clothing", "2004", "clothing/womens"),
        ],
    },
    SeedCategory {
        name: "Home & Garden",
        external_id: "1003",
        slug: "home-garden",
        children: &[],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent: Option<i64>) -> CategoryNode {
        CategoryNode {
            id: CategoryId::new(id),
            name: format!("cat-{id}"),
            parent_id: parent.map(CategoryId::new),
            external_id: id.to_string(),
            slug: format!("cat-{id}"),
        }
    }

    #[test]
    fn leaves_exclude_parents() {
        let nodes = vec![node(1, None), node(2, Some(1)), node(3, Some(1)), node(4, None)];
        let ids: Vec<i64> = leaves(&nodes).iter().map(|n| n.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn single_root_is_a_leaf() {
        let nodes = vec![node(9, None)];
        assert_eq!(leaves(&nodes).len(), 1);
    }

    #[test]
    fn seed_tree_has_five_leaves() {
        let leaf_count: usize = SEED_TREE
            .iter()
            .map(|root| root.children.len().max(1))
            .sum();
        assert_eq!(leaf_count, 5);
    }
}
