// ==========================================
// 机加工排产系统 - 分批规划引擎
// ==========================================
// 职责: 将订单总数量切分为一个或多个批次
// 红线: 批次数量之和必须严格等于订单总数量
// ==========================================
// 模式:
//   single-batch      整单一批
//   custom-batch-size 按固定批量依次切分（默认 300）
//   auto-split        按数量区间 + 优先级自动切分（默认）
// ==========================================

use crate::domain::order::{Batch, Order};
use crate::domain::types::{BatchMode, Priority};
use tracing::{debug, instrument};

// 数量区间边界
const SINGLE_BATCH_MAX: u32 = 250;
const TWO_BATCH_MAX: u32 = 500;
const THREE_BATCH_MAX: u32 = 1000;
// 大订单每批目标数量
const LARGE_BATCH_PARALLEL: u32 = 334;
const LARGE_BATCH_NORMAL: u32 = 500;

/// 分批请求
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchRequest {
    pub quantity: u32,
    pub min_batch_size: u32,
    pub priority: Priority,
    pub mode: BatchMode,
    pub custom_size: Option<u32>,
}

impl BatchRequest {
    pub fn for_order(order: &Order) -> Self {
        Self {
            quantity: order.quantity,
            min_batch_size: order.min_batch_size(),
            priority: order.priority,
            mode: order.batch_mode,
            custom_size: order.custom_batch_size,
        }
    }
}

// ==========================================
// BatchPlanner - 分批规划
// ==========================================
pub struct BatchPlanner {
    default_custom_size: u32,
}

impl BatchPlanner {
    /// # 参数
    /// - default_custom_size: custom-batch-size 模式下未指定/非法批量时的默认值
    pub fn new(default_custom_size: u32) -> Self {
        Self {
            default_custom_size: default_custom_size.max(1),
        }
    }

    /// 生成批次序列
    ///
    /// # 返回
    /// 有序批次列表；quantity > 0 时至少一个批次
    #[instrument(skip(self), fields(quantity = request.quantity, mode = %request.mode))]
    pub fn plan(&self, request: BatchRequest) -> Vec<Batch> {
        if request.quantity == 0 {
            return Vec::new();
        }

        let sizes = match request.mode {
            BatchMode::SingleBatch => vec![request.quantity],
            BatchMode::CustomBatchSize => {
                let size = request
                    .custom_size
                    .filter(|s| *s > 0)
                    .unwrap_or(self.default_custom_size);
                carve(request.quantity, size)
            }
            BatchMode::AutoSplit => {
                let count = self.auto_split_count(request.quantity, request.priority);
                let count = respect_min_batch(request.quantity, count, request.min_batch_size);
                balanced(request.quantity, count)
            }
        };

        debug!(batch_sizes = ?sizes, "分批完成");

        sizes
            .into_iter()
            .enumerate()
            .filter_map(|(index, quantity)| Batch::new(index, quantity).ok())
            .collect()
    }

    pub fn plan_for_order(&self, order: &Order) -> Vec<Batch> {
        self.plan(BatchRequest::for_order(order))
    }

    /// auto-split 批次数
    ///
    /// 规则:
    /// - Q ≤ 250: 1 批
    /// - 250 < Q ≤ 500: 2 批
    /// - 500 < Q ≤ 1000: High/Urgent 3 批；否则取 Q%2 与 Q%3 中余数较小者（相等取 2）
    /// - Q > 1000: High/Urgent ceil(Q/334)，否则 ceil(Q/500)
    pub fn auto_split_count(&self, quantity: u32, priority: Priority) -> u32 {
        if quantity <= SINGLE_BATCH_MAX {
            1
        } else if quantity <= TWO_BATCH_MAX {
            2
        } else if quantity <= THREE_BATCH_MAX {
            if priority.prefers_parallelism() || quantity % 3 < quantity % 2 {
                3
            } else {
                2
            }
        } else if priority.prefers_parallelism() {
            quantity.div_ceil(LARGE_BATCH_PARALLEL)
        } else {
            quantity.div_ceil(LARGE_BATCH_NORMAL)
        }
    }
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(300)
    }
}

/// 依次切下 min(size, remaining)
fn carve(quantity: u32, size: u32) -> Vec<u32> {
    let mut remaining = quantity;
    let mut sizes = Vec::new();
    while remaining > 0 {
        let take = size.min(remaining);
        sizes.push(take);
        remaining -= take;
    }
    sizes
}

/// 近似等分，余数逐个分配给前面的批次
fn balanced(quantity: u32, count: u32) -> Vec<u32> {
    let count = count.clamp(1, quantity);
    let base = quantity / count;
    let remainder = quantity % count;
    (0..count)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// 任一批次低于最小批量时减少批次数
fn respect_min_batch(quantity: u32, mut count: u32, min_batch_size: u32) -> u32 {
    while count > 1 && quantity / count < min_batch_size {
        count -= 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: u32, priority: Priority) -> BatchRequest {
        BatchRequest {
            quantity,
            min_batch_size: 1,
            priority,
            mode: BatchMode::AutoSplit,
            custom_size: None,
        }
    }

    fn sizes(batches: &[Batch]) -> Vec<u32> {
        batches.iter().map(|b| b.quantity).collect()
    }

    #[test]
    fn test_auto_split_boundaries() {
        let planner = BatchPlanner::default();
        assert_eq!(sizes(&planner.plan(request(250, Priority::Normal))), vec![250]);
        assert_eq!(sizes(&planner.plan(request(251, Priority::Normal))), vec![126, 125]);
        assert_eq!(sizes(&planner.plan(request(500, Priority::Low))), vec![250, 250]);
        assert_eq!(sizes(&planner.plan(request(1000, Priority::Normal))), vec![500, 500]);
        assert_eq!(
            sizes(&planner.plan(request(1200, Priority::High))),
            vec![300, 300, 300, 300]
        );
    }

    #[test]
    fn test_mid_range_remainder_rule() {
        let planner = BatchPlanner::default();
        // 999 % 2 = 1, 999 % 3 = 0 → 3 批
        assert_eq!(sizes(&planner.plan(request(999, Priority::Normal))), vec![333, 333, 333]);
        // 高优先级固定 3 批，余数分配给前面的批次
        assert_eq!(sizes(&planner.plan(request(1000, Priority::Urgent))), vec![334, 333, 333]);
        // 601 % 2 = 1, 601 % 3 = 1 → 相等取 2 批
        assert_eq!(sizes(&planner.plan(request(601, Priority::Normal))), vec![301, 300]);
    }

    #[test]
    fn test_large_orders() {
        let planner = BatchPlanner::default();
        let batches = planner.plan(request(2001, Priority::Normal));
        assert_eq!(batches.len(), 5);
        assert_eq!(sizes(&batches).iter().sum::<u32>(), 2001);
        assert_eq!(batches[4].id, "B05");
    }

    #[test]
    fn test_custom_batch_size() {
        let planner = BatchPlanner::default();
        let mut req = request(700, Priority::Normal);
        req.mode = BatchMode::CustomBatchSize;
        assert_eq!(sizes(&planner.plan(req)), vec![300, 300, 100]);

        req.custom_size = Some(250);
        assert_eq!(sizes(&planner.plan(req)), vec![250, 250, 200]);

        req.custom_size = Some(0);
        assert_eq!(sizes(&planner.plan(req)), vec![300, 300, 100]);
    }

    #[test]
    fn test_single_batch_mode() {
        let planner = BatchPlanner::default();
        let mut req = request(5000, Priority::Urgent);
        req.mode = BatchMode::SingleBatch;
        assert_eq!(sizes(&planner.plan(req)), vec![5000]);
    }

    #[test]
    fn test_min_batch_size_reduces_count() {
        let planner = BatchPlanner::default();
        let mut req = request(1200, Priority::High);
        req.min_batch_size = 500;
        assert_eq!(sizes(&planner.plan(req)), vec![600, 600]);

        req.min_batch_size = 2000;
        assert_eq!(sizes(&planner.plan(req)), vec![1200]);
    }

    #[test]
    fn test_batch_sum_invariant() {
        let planner = BatchPlanner::default();
        for quantity in [1, 249, 250, 251, 499, 500, 501, 777, 1000, 1001, 3337, 10_000] {
            for priority in [Priority::Low, Priority::Normal, Priority::High, Priority::Urgent] {
                let batches = planner.plan(request(quantity, priority));
                assert!(!batches.is_empty());
                assert_eq!(sizes(&batches).iter().sum::<u32>(), quantity);
                assert!(batches.iter().all(|b| b.quantity > 0));
            }
        }
    }
}
