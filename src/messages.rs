//! Localized message templates.
//!
//! Lookup order is `(language, key)`, then `("en", key)`, then the key
//! itself. `{name}` placeholders are filled from the params; unknown
//! placeholders are left as written.

use std::sync::LazyLock;

use regex::{Captures, Regex};

type Table = &'static [(&'static str, &'static str)];

const EN: Table = &[
    ("commit-guard.block.failed", "🌈 Prism ✋ Commit blocked: last test run FAILED. Fix tests before committing."),
    ("commit-guard.warn.no-test", "🌈 Prism > No test run detected this session. Run tests before committing."),
    ("commit-guard.warn.stale", "🌈 Prism > Last test run was {minutes}min ago. Run tests before committing."),
    ("debug-loop.block.divergent", "🌈 Prism ✋ Debug Loop blocked: {name} edited {count} times on same area. Discuss approach with user before continuing."),
    ("debug-loop.warn.divergent", "🌈 Prism > Debug Loop: {name} edited {count} times on same area. Stop and investigate root cause."),
    ("debug-loop.warn.convergent", "🌈 Prism > Debug Loop: {name} edited {count} times (different areas). Consider if this is expected."),
    ("scope-guard.block", "🌈 Prism ✋ Scope Guard: {count} unique files modified without a plan. Run /prism to decompose before continuing."),
    ("scope-guard.warn", "🌈 Prism > Scope Guard: {count} unique files modified. Consider running /prism to decompose the task."),
    ("scope-guard.warn.planned", "🌈 Prism > Scope Guard: {count} unique files modified. A plan is active, so this is not blocked. Check progress against the plan."),
    ("scope-guard.plan-detected", "🌈 Prism 📋 Plan file detected. Scope thresholds raised."),
    ("test-tracker.warn.failed", "🌈 Prism 📊 Tests FAILED. Fix before committing."),
    ("plan-enforcement.warn.no-plan", "🌈 Prism 📋 {count} source files modified (threshold {threshold}) and no plan found. Decompose the task into a plan before continuing."),
    ("alignment.warn.drift", "🌈 Prism 🧭 Scope drift: editing {dir} (outside base scope: {scope}). Verify this is intended."),
    ("alignment.config-change", "🌈 Prism 🔧 Config change: {file}. Ensure this was discussed with user."),
    ("alignment.package-install", "🌈 Prism 📦 New dependency being installed. Verify this was agreed upon."),
    ("alignment.db-migration", "🌈 Prism 🗄️ Database migration detected. This is a major decision, confirm with user."),
    ("alignment.warn.destructive", "🌈 Prism ⚠️ Destructive command detected: {command}. Confirm with user before proceeding."),
    ("turn-reporter.warn.silent", "🌈 Prism ⏰ {turns} turns without user input. Files changed: {files}. Report progress before continuing."),
    ("turn-reporter.summary.header", "🌈 Prism Turn #{turn}:"),
    ("turn-reporter.summary.files", "Files: {files}"),
    ("turn-reporter.summary.more", "+{count} more"),
    ("turn-reporter.summary.tests", "Tests: {passed} passed"),
    ("turn-reporter.summary.tests-failed", "Tests: {passed} passed, {failed} failed"),
    ("turn-reporter.summary.blocks", "Blocks: {count}"),
    ("pipeline.block.default", "🌈 Prism ✋ Action blocked."),
];

const KO: Table = &[
    ("commit-guard.block.failed", "🌈 Prism ✋ 커밋 차단: 마지막 테스트 실패. 테스트를 수정한 후 커밋하세요."),
    ("commit-guard.warn.no-test", "🌈 Prism > 이 세션에서 테스트 실행 이력이 없습니다. 커밋 전에 테스트를 실행하세요."),
    ("commit-guard.warn.stale", "🌈 Prism > 마지막 테스트가 {minutes}분 전입니다. 커밋 전에 테스트를 실행하세요."),
    ("debug-loop.block.divergent", "🌈 Prism ✋ 디버그 루프 차단: {name}이 같은 영역에서 {count}회 수정됨. 사용자와 접근 방식을 논의하세요."),
    ("debug-loop.warn.divergent", "🌈 Prism > 디버그 루프: {name}이 같은 영역에서 {count}회 수정됨. 멈추고 근본 원인을 조사하세요."),
    ("debug-loop.warn.convergent", "🌈 Prism > 디버그 루프: {name}이 {count}회 수정됨 (다른 영역). 예상된 작업인지 확인하세요."),
    ("scope-guard.block", "🌈 Prism ✋ 스코프 가드: 계획 없이 {count}개 고유 파일 수정됨. /prism으로 분해 후 계속하세요."),
    ("scope-guard.warn", "🌈 Prism > 스코프 가드: {count}개 고유 파일 수정됨. /prism으로 작업을 분해하는 것을 고려하세요."),
    ("scope-guard.plan-detected", "🌈 Prism 📋 계획 파일 감지됨. 스코프 임계값이 상향 조정되었습니다."),
    ("test-tracker.warn.failed", "🌈 Prism 📊 테스트 실패. 커밋 전에 수정하세요."),
];

const JA: Table = &[
    ("commit-guard.block.failed", "🌈 Prism ✋ コミットブロック: 最後のテストが失敗しました。テストを修正してからコミットしてください。"),
    ("commit-guard.warn.no-test", "🌈 Prism > このセッションでテスト実行が検出されません。コミット前にテストを実行してください。"),
    ("commit-guard.warn.stale", "🌈 Prism > 最後のテスト実行は{minutes}分前です。コミット前にテストを実行してください。"),
    ("debug-loop.block.divergent", "🌈 Prism ✋ デバッグループブロック: {name}が同じ領域で{count}回編集されました。ユーザーとアプローチを議論してください。"),
    ("debug-loop.warn.divergent", "🌈 Prism > デバッグループ: {name}が同じ領域で{count}回編集されました。停止して根本原因を調査してください。"),
    ("debug-loop.warn.convergent", "🌈 Prism > デバッグループ: {name}が{count}回編集されました（異なる領域）。想定通りか確認してください。"),
    ("scope-guard.block", "🌈 Prism ✋ スコープガード: 計画なしに{count}個のファイルが変更されました。/prismで分解してから続行してください。"),
    ("scope-guard.warn", "🌈 Prism > スコープガード: {count}個のファイルが変更されました。/prismでタスクの分解を検討してください。"),
    ("scope-guard.plan-detected", "🌈 Prism 📋 計画ファイルを検出。スコープ閾値を引き上げました。"),
    ("test-tracker.warn.failed", "🌈 Prism 📊 テスト失敗。コミット前に修正してください。"),
];

const ZH: Table = &[
    ("commit-guard.block.failed", "🌈 Prism ✋ 提交被阻止：上次测试失败。请修复测试后再提交。"),
    ("commit-guard.warn.no-test", "🌈 Prism > 本次会话未检测到测试运行。请在提交前运行测试。"),
    ("commit-guard.warn.stale", "🌈 Prism > 上次测试运行在{minutes}分钟前。请在提交前运行测试。"),
    ("debug-loop.block.divergent", "🌈 Prism ✋ 调试循环阻止：{name}在同一区域被编辑了{count}次。请与用户讨论方法。"),
    ("debug-loop.warn.divergent", "🌈 Prism > 调试循环：{name}在同一区域被编辑了{count}次。停止并调查根本原因。"),
    ("debug-loop.warn.convergent", "🌈 Prism > 调试循环：{name}被编辑了{count}次（不同区域）。请确认这是否是预期行为。"),
    ("scope-guard.block", "🌈 Prism ✋ 范围守卫：未制定计划就修改了{count}个文件。请运行/prism分解后再继续。"),
    ("scope-guard.warn", "🌈 Prism > 范围守卫：已修改{count}个文件。请考虑运行/prism来分解任务。"),
    ("scope-guard.plan-detected", "🌈 Prism 📋 检测到计划文件。范围阈值已提高。"),
    ("test-tracker.warn.failed", "🌈 Prism 📊 测试失败。请在提交前修复。"),
];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex"));

fn table(language: &str) -> Option<Table> {
    match language {
        "en" => Some(EN),
        "ko" => Some(KO),
        "ja" => Some(JA),
        "zh" => Some(ZH),
        _ => None,
    }
}

fn lookup(table: Table, key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Render the message `key` in `language` with `{name}` params filled in.
pub fn get(language: &str, key: &str, params: &[(&str, String)]) -> String {
    let template = table(language)
        .and_then(|t| lookup(t, key))
        .or_else(|| lookup(EN, key))
        .unwrap_or(key);
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            params
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
