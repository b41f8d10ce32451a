/// 系统调用接口
/// Node behaviours steer the token currently being executed through this interface.
pub trait Syscall {
    /// Continue along the given targets, one token per target, all in the current scope.
    fn jump(&mut self, targets: Vec<String>);

    /// Park the token on the current node as an execution pointer.
    fn wait(&mut self);

    /// Park a scope pointer on the current node and start `start` inside it.
    fn open_scope(&mut self, start: String);

    /// Arrive at a join gateway; continue to `next` once `expected` tokens have arrived.
    fn join(&mut self, expected: usize, next: Vec<String>);

    /// 结束当前分支
    fn terminate(&mut self);
}
