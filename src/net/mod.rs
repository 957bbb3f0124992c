//! # Petri 网模型与令牌游戏
//!
//! 网由库所 `P`、迁移 `T` 与弧 `F ⊆ (P×T) ∪ (T×P)` 组成，弧从不连接两个同类节点。
//! 所有元素按字符串 id 存放在 [`PetriNet`] 中（保持插入顺序），节点与弧之间只通过
//! id 相互引用，由网统一维护双向一致性：
//!
//! * `a ∈ out(n) ⟺ source(a) = n`，`a ∈ in(n) ⟺ target(a) = n`；
//! * 同一方向上，两个节点之间至多一条弧；
//! * 删除节点会级联删除与其相连的所有弧。
//!
//! 迁移 `t` **可发生** 当且仅当其每条输入弧的源库所至少有一个令牌（无输入弧时恒可发生）。
//! 发生时从每个输入库所取走一个令牌，记取走总数为 `k`，然后**每个**输出库所都增加 `k`
//! 个令牌。禁用的迁移或没有输出弧的迁移发生时什么也不做。
//!
//! 网可以与 PNML 文本相互转换（见 [`io::pnml`]），也可以保存为 JSON/RON 快照。
//!
//! ## 示例
//!
//! ```rust
//! use yapne::net::*;
//!
//! let mut net = PetriNet::new();
//! net.add_element(Place::with_marking("p0", 1)).unwrap();
//! net.add_element(Place::new("p1")).unwrap();
//! net.add_element(Transition::new("t0")).unwrap();
//!
//! net.connect_to_node("p0", "t0").unwrap();
//! net.connect_to_node("t0", "p1").unwrap();
//!
//! assert_eq!(net.enabled_transitions(), vec![ElementId::from("t0")]);
//! assert!(net.occur("t0").unwrap());
//! assert_eq!(net.place("p0").unwrap().marking(), 0);
//! assert_eq!(net.place("p1").unwrap().marking(), 1);
//!
//! let reloaded = io::pnml::import_pnml(&net.to_pnml()).unwrap();
//! assert_eq!(reloaded.place("p1").unwrap().marking(), 1);
//! ```

pub mod core;
pub mod ids;
pub mod io;
pub mod structure;

pub use self::core::{NetError, PNML_HEADER, PetriNet};
pub use ids::{ArcIdSequence, ElementId};
pub use io::IoError;
pub use structure::{
    Arc, ArcDirection, Element, ElementKind, Node, Place, Position, Transition, Weight,
};
